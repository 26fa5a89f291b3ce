//! NativeScript class registration
//!
//! A class is a Rust type implementing [`NativeClass`]. Each script instance
//! is a `Box<T>` whose pointer the host keeps as the instance's userdata;
//! the create and destroy trampolines generated here allocate and free it.
//!
//! Methods are registered from [`NativeClassMethods`], usually implemented by
//! the `#[methods]` attribute, which turns each method into an `extern "C"`
//! trampoline with the [`MethodFn`] signature.
//!
//! ```ignore
//! struct Counter { count: i64 }
//!
//! impl NativeClass for Counter {
//!     const CLASS_NAME: &'static str = "Counter";
//!     fn init(_owner: Owner) -> Self { Counter { count: 0 } }
//! }
//!
//! #[methods]
//! impl Counter {
//!     fn increment(&mut self, by: i64) -> i64 {
//!         self.count += by;
//!         self.count
//!     }
//! }
//!
//! fn nativescript_init(handle: &InitHandle) {
//!     if let Err(e) = handle.add_class::<Counter>() {
//!         gd_error!("{e}");
//!     }
//! }
//! ```

use std::ffi::{CString, c_void};
use std::marker::PhantomData;
use std::ptr;

use crate::convert::{FromVariant, ToVariant};
use crate::error::{Error, Result};
use crate::resolver::{ApiTables, Core};
use crate::string::GdString;
use crate::sys::{
    ApiKind, GodotObject, GodotVariant, InstanceCreateFunc, InstanceDestroyFunc, InstanceMethod,
    MethodAttributes, MethodFn, NativeScriptApi, PROPERTY_HINT_NONE, PROPERTY_USAGE_DEFAULT,
    PropertyAttributes, PropertyGetFunc, PropertySetFunc, RpcMode, Signal, SignalArgument,
    VariantType,
};
use crate::variant::{Variant, VariantRef};

/// Engine object a script instance is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner(*mut GodotObject);

impl Owner {
    #[inline]
    pub fn from_sys(ptr: *mut GodotObject) -> Self {
        Self(ptr)
    }

    #[inline]
    pub fn as_ptr(self) -> *mut GodotObject {
        self.0
    }
}

/// A Rust type exposed to the engine as a script class.
pub trait NativeClass: Sized + 'static {
    /// Name the class is registered under
    const CLASS_NAME: &'static str;
    /// Engine class the script extends
    const BASE_CLASS: &'static str = "Reference";

    /// Construct the state of a new instance.
    fn init(owner: Owner) -> Self;
}

/// Registers a class's methods, properties and signals.
pub trait NativeClassMethods: NativeClass {
    fn register_methods(builder: &ClassBuilder<'_, Self>) -> Result<()>;
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::InvalidName(name.to_owned()))
}

// =============================================================================
// Instance lifecycle
// =============================================================================

unsafe extern "C" fn create_instance<T: NativeClass>(
    owner: *mut GodotObject,
    _method_data: *mut c_void,
) -> *mut c_void {
    Box::into_raw(Box::new(T::init(Owner(owner)))).cast()
}

unsafe extern "C" fn destroy_instance<T: NativeClass>(
    _owner: *mut GodotObject,
    _method_data: *mut c_void,
    user_data: *mut c_void,
) {
    if !user_data.is_null() {
        // SAFETY: created by `create_instance::<T>`, destroyed once by the host
        drop(unsafe { Box::from_raw(user_data.cast::<T>()) });
    }
}

/// Recover the instance behind a userdata pointer.
///
/// # Safety
/// `user_data` must be null or come from the create trampoline of `T`, and
/// no other reference to the instance may be live.
pub unsafe fn instance_mut<'a, T: NativeClass>(user_data: *mut c_void) -> Option<&'a mut T> {
    unsafe { user_data.cast::<T>().as_mut() }
}

/// Shared form of [`instance_mut`].
///
/// # Safety
/// As [`instance_mut`], except shared references may coexist.
pub unsafe fn instance_ref<'a, T: NativeClass>(user_data: *mut c_void) -> Option<&'a T> {
    unsafe { user_data.cast::<T>().cast_const().as_ref() }
}

// =============================================================================
// Init handle
// =============================================================================

/// Argument of `godot_nativescript_init`.
pub struct InitHandle {
    tables: &'static ApiTables,
    handle: *mut c_void,
}

impl InitHandle {
    /// # Safety
    /// `handle` must be the value the host passed to `godot_nativescript_init`.
    pub unsafe fn new(tables: &'static ApiTables, handle: *mut c_void) -> Self {
        Self { tables, handle }
    }

    #[inline]
    pub fn core(&self) -> Core {
        self.tables.core()
    }

    /// Register `T` as a runtime-only script class.
    pub fn add_class<T: NativeClassMethods>(&self) -> Result<()> {
        self.register::<T>(false)
    }

    /// Register `T` as a script class that also runs in the editor.
    pub fn add_tool_class<T: NativeClassMethods>(&self) -> Result<()> {
        self.register::<T>(true)
    }

    fn register<T: NativeClassMethods>(&self, tool: bool) -> Result<()> {
        let ns = self
            .tables
            .nativescript
            .ok_or(Error::MissingExtension(ApiKind::NativeScript))?;
        let class_name = c_name(T::CLASS_NAME)?;
        let base = c_name(T::BASE_CLASS)?;

        let create = InstanceCreateFunc {
            create_func: Some(create_instance::<T>),
            method_data: ptr::null_mut(),
            free_func: None,
        };
        let destroy = InstanceDestroyFunc {
            destroy_func: Some(destroy_instance::<T>),
            method_data: ptr::null_mut(),
            free_func: None,
        };
        let register = if tool {
            ns.register_tool_class
        } else {
            ns.register_class
        };
        // SAFETY: names are terminated and copied by the host
        unsafe { register(self.handle, class_name.as_ptr(), base.as_ptr(), create, destroy) };
        tracing::debug!(target: "gdnhl", class = T::CLASS_NAME, base = T::BASE_CLASS, tool, "class registered");

        let builder = ClassBuilder {
            ns,
            core: self.core(),
            handle: self.handle,
            class_name,
            _marker: PhantomData,
        };
        T::register_methods(&builder)
    }
}

// =============================================================================
// Class builder
// =============================================================================

/// Signal parameter description
#[derive(Clone, Copy, Debug)]
pub struct SignalArg<'a> {
    pub name: &'a str,
    pub ty: VariantType,
}

/// Registers members of class `T`.
pub struct ClassBuilder<'a, T> {
    ns: &'static NativeScriptApi,
    core: Core,
    handle: *mut c_void,
    class_name: CString,
    _marker: PhantomData<(&'a InitHandle, fn(T))>,
}

impl<T: NativeClass> ClassBuilder<'_, T> {
    #[inline]
    pub fn core(&self) -> Core {
        self.core
    }

    /// Register a method trampoline.
    pub fn add_method(&self, name: &str, method: MethodFn) -> Result<()> {
        self.add_method_with_rpc(name, method, RpcMode::Disabled)
    }

    /// Register a method trampoline callable over the network in `rpc` mode.
    pub fn add_method_with_rpc(&self, name: &str, method: MethodFn, rpc: RpcMode) -> Result<()> {
        let function_name = c_name(name)?;
        let method = InstanceMethod {
            method: Some(method),
            method_data: ptr::null_mut(),
            free_func: None,
        };
        // SAFETY: names are terminated and copied by the host
        unsafe {
            (self.ns.register_method)(
                self.handle,
                self.class_name.as_ptr(),
                function_name.as_ptr(),
                MethodAttributes { rpc_type: rpc },
                method,
            )
        };
        tracing::trace!(target: "gdnhl", class = T::CLASS_NAME, method = name, "method registered");
        Ok(())
    }

    /// Register a property backed by a getter and a setter.
    ///
    /// The property's type is taken from `default`.
    pub fn add_property<V>(
        &self,
        path: &str,
        default: V,
        getter: fn(&T) -> V,
        setter: fn(&mut T, V),
    ) -> Result<()>
    where
        V: ToVariant + FromVariant + 'static,
    {
        let path = c_name(path)?;
        let default = default.to_variant(self.core);
        let hint_string = GdString::new(self.core);

        let mut attr = PropertyAttributes {
            rset_type: RpcMode::Disabled,
            type_: default.get_type().map_or(0, VariantType::to_sys),
            hint: PROPERTY_HINT_NONE,
            hint_string: hint_string.alias(),
            usage: PROPERTY_USAGE_DEFAULT,
            default_value: default.alias(),
        };

        let accessors = Box::into_raw(Box::new(Accessors {
            get: getter,
            set: setter,
            core: self.core,
        }))
        .cast::<c_void>();
        // Both funcs share `accessors`; only the setter frees it
        let set = PropertySetFunc {
            set_func: Some(set_property::<T, V>),
            method_data: accessors,
            free_func: Some(free_accessors::<T, V>),
        };
        let get = PropertyGetFunc {
            get_func: Some(get_property::<T, V>),
            method_data: accessors,
            free_func: None,
        };

        // SAFETY: the host copies the attributes; `hint_string` and `default`
        // outlive the call and are destroyed once, by their own drops
        unsafe {
            (self.ns.register_property)(
                self.handle,
                self.class_name.as_ptr(),
                path.as_ptr(),
                &mut attr,
                set,
                get,
            )
        };
        tracing::trace!(target: "gdnhl", class = T::CLASS_NAME, property = ?path, "property registered");
        Ok(())
    }

    /// Register a signal. Arguments have no defaults.
    pub fn add_signal(&self, name: &str, args: &[SignalArg<'_>]) -> Result<()> {
        let core = self.core;
        let name_string = GdString::from_str(core, name);
        let arg_names: Vec<GdString> = args.iter().map(|a| GdString::from_str(core, a.name)).collect();
        let hint_string = GdString::new(core);
        let nil = Variant::nil(core);

        let mut sys_args: Vec<SignalArgument> = args
            .iter()
            .zip(&arg_names)
            .map(|(arg, arg_name)| SignalArgument {
                name: arg_name.alias(),
                type_: arg.ty.to_sys(),
                hint: PROPERTY_HINT_NONE,
                hint_string: hint_string.alias(),
                usage: PROPERTY_USAGE_DEFAULT,
                default_value: nil.alias(),
            })
            .collect();
        let signal = Signal {
            name: name_string.alias(),
            num_args: sys_args.len() as _,
            args: if sys_args.is_empty() {
                ptr::null_mut()
            } else {
                sys_args.as_mut_ptr()
            },
            num_default_args: 0,
            default_args: ptr::null_mut(),
        };

        // SAFETY: the host copies the signal; every aliased value outlives the call
        unsafe { (self.ns.register_signal)(self.handle, self.class_name.as_ptr(), &signal) };
        tracing::trace!(target: "gdnhl", class = T::CLASS_NAME, signal = name, "signal registered");
        Ok(())
    }
}

// =============================================================================
// Property trampolines
// =============================================================================

struct Accessors<T, V> {
    get: fn(&T) -> V,
    set: fn(&mut T, V),
    core: Core,
}

unsafe extern "C" fn get_property<T: NativeClass, V: ToVariant>(
    _owner: *mut GodotObject,
    method_data: *mut c_void,
    user_data: *mut c_void,
) -> GodotVariant {
    // SAFETY: `method_data` is the `Accessors` registered with this getter
    let accessors = unsafe { &*method_data.cast::<Accessors<T, V>>() };
    match unsafe { instance_ref::<T>(user_data) } {
        Some(this) => (accessors.get)(this).to_variant(accessors.core).into_sys(),
        None => Variant::nil(accessors.core).into_sys(),
    }
}

unsafe extern "C" fn set_property<T: NativeClass, V: FromVariant>(
    _owner: *mut GodotObject,
    method_data: *mut c_void,
    user_data: *mut c_void,
    value: *mut GodotVariant,
) {
    // SAFETY: `method_data` is the `Accessors` registered with this setter
    let accessors = unsafe { &*method_data.cast::<Accessors<T, V>>() };
    if value.is_null() {
        return;
    }
    if let Some(this) = unsafe { instance_mut::<T>(user_data) } {
        let value = V::from_variant(unsafe { VariantRef::from_sys(accessors.core, value) });
        (accessors.set)(this, value);
    }
}

unsafe extern "C" fn free_accessors<T, V>(method_data: *mut c_void) {
    if !method_data.is_null() {
        drop(unsafe { Box::from_raw(method_data.cast::<Accessors<T, V>>()) });
    }
}
