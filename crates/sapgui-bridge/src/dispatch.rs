//! Late-bound IDispatch access to the SAP GUI Scripting object model.
//!
//! SAP GUI only exposes its scripting API through IDispatch, so every call is
//! a name lookup followed by `Invoke`, the same way VBScript drives it.

#![cfg(windows)]

use std::mem::ManuallyDrop;
use std::ptr;

use windows::{
    core::{BSTR, GUID, HSTRING, PCWSTR},
    Win32::{
        Foundation::{DISP_E_EXCEPTION, VARIANT_BOOL},
        Globalization::GetSystemDefaultLCID,
        System::{
            Com::{
                CoGetObject, IDispatch, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
                DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO,
            },
            Ole::DISPID_PROPERTYPUT,
            Variant::{
                VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_EMPTY, VT_I2, VT_I4, VT_NULL,
            },
        },
    },
};

// VARIANT keeps its unions behind ManuallyDrop; fields are written with
// ptr::write so the previous (empty) contents are never dropped.

pub fn variant_bool(val: bool) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BOOL);
        ptr::write(
            &mut inner.Anonymous.boolVal,
            VARIANT_BOOL(if val { -1 } else { 0 }),
        );
        v
    }
}

pub fn variant_i32(val: i32) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_I4);
        ptr::write(&mut inner.Anonymous.lVal, val);
        v
    }
}

pub fn variant_str(val: &str) -> VARIANT {
    unsafe {
        let mut v = VARIANT::default();
        let inner = &mut *v.Anonymous.Anonymous;
        ptr::write(&mut inner.vt, VT_BSTR);
        ptr::write(&mut inner.Anonymous.bstrVal, ManuallyDrop::new(BSTR::from(val)));
        v
    }
}

fn variant_vt(v: &VARIANT) -> u16 {
    unsafe { v.Anonymous.Anonymous.vt.0 }
}

fn variant_is_empty(v: &VARIANT) -> bool {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        vt == VT_EMPTY || vt == VT_NULL
    }
}

/// `Text`, `Id`, `Type` and friends all come back as BSTR.
pub fn variant_get_string(v: &VARIANT) -> Option<String> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_BSTR {
            Some(v.Anonymous.Anonymous.Anonymous.bstrVal.to_string())
        } else {
            None
        }
    }
}

/// `Count`, `RowCount` and similar are `Long`, occasionally `Integer`.
pub fn variant_get_i32(v: &VARIANT) -> Option<i32> {
    unsafe {
        let vt = v.Anonymous.Anonymous.vt;
        let anon = &v.Anonymous.Anonymous.Anonymous;
        if vt == VT_I4 {
            Some(anon.lVal)
        } else if vt == VT_I2 {
            Some(anon.iVal as i32)
        } else {
            None
        }
    }
}

fn variant_get_dispatch(v: &VARIANT) -> Option<IDispatch> {
    unsafe {
        if v.Anonymous.Anonymous.vt == VT_DISPATCH {
            let opt_disp: &Option<IDispatch> = &v.Anonymous.Anonymous.Anonymous.pdispVal;
            opt_disp.clone()
        } else {
            None
        }
    }
}

/// An IDispatch COM object from the scripting tree.
#[derive(Clone)]
pub struct DispatchObject {
    inner: IDispatch,
}

impl DispatchObject {
    /// Bind to a running object by moniker, like VBScript's `GetObject("SAPGUI")`.
    pub fn get_object(moniker: &str) -> Result<Self, String> {
        unsafe {
            let name = HSTRING::from(moniker);
            let disp: IDispatch = CoGetObject(&name, None)
                .map_err(|e| format!("GetObject('{moniker}') failed: {e}"))?;
            Ok(Self { inner: disp })
        }
    }

    fn get_dispid(&self, name: &str) -> Result<i32, String> {
        unsafe {
            let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
            let names = [PCWSTR(wide.as_ptr())];
            let mut dispid = 0i32;
            self.inner
                .GetIDsOfNames(
                    &GUID::zeroed(),
                    names.as_ptr(),
                    1,
                    GetSystemDefaultLCID(),
                    &mut dispid,
                )
                .map_err(|e| format!("GetIDsOfNames('{name}') failed: {e}"))?;
            Ok(dispid)
        }
    }

    /// `Invoke` with positional arguments given in natural order.
    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> Result<VARIANT, String> {
        let dispid = self.get_dispid(name)?;
        unsafe {
            // DISPPARAMS wants the arguments last-to-first.
            let mut reversed: Vec<VARIANT> = args.iter().rev().cloned().collect();
            let mut named_args = [DISPID_PROPERTYPUT];
            let is_put = flags == DISPATCH_PROPERTYPUT;
            let params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispidNamedArgs: if is_put {
                    named_args.as_mut_ptr()
                } else {
                    ptr::null_mut()
                },
                cArgs: reversed.len() as u32,
                cNamedArgs: if is_put { 1 } else { 0 },
            };
            let mut result = VARIANT::default();
            let result_ptr: Option<*mut VARIANT> = if is_put {
                None
            } else {
                Some(&mut result)
            };
            let mut except = EXCEPINFO::default();
            self.inner
                .Invoke(
                    dispid,
                    &GUID::zeroed(),
                    GetSystemDefaultLCID(),
                    flags,
                    &params,
                    result_ptr,
                    Some(&mut except),
                    None,
                )
                .map_err(|e| format_invoke_error(e, &except, name))?;
            Ok(result)
        }
    }

    pub fn get_property(&self, name: &str) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    pub fn set_property(&self, name: &str, value: VARIANT) -> Result<(), String> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value])?;
        Ok(())
    }

    pub fn invoke_method(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT, String> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// A property that returns another scripting object.
    pub fn get_child(&self, name: &str) -> Result<DispatchObject, String> {
        let variant = self.get_property(name)?;
        extract_dispatch(&variant, name)
    }

    /// A method that returns another scripting object.
    pub fn invoke_child(&self, name: &str, args: &[VARIANT]) -> Result<DispatchObject, String> {
        let variant = self.invoke_method(name, args)?;
        extract_dispatch(&variant, name)
    }

    pub fn get_string(&self, name: &str) -> Result<String, String> {
        let variant = self.get_property(name)?;
        if variant_is_empty(&variant) {
            return Ok(String::new());
        }
        variant_get_string(&variant).ok_or_else(|| {
            format!(
                "'{name}' returned VT={}, expected a string",
                variant_vt(&variant)
            )
        })
    }

    pub fn get_i32(&self, name: &str) -> Result<i32, String> {
        let variant = self.get_property(name)?;
        variant_get_i32(&variant).ok_or_else(|| {
            format!(
                "'{name}' returned VT={}, expected an integer",
                variant_vt(&variant)
            )
        })
    }
}

fn extract_dispatch(variant: &VARIANT, context: &str) -> Result<DispatchObject, String> {
    if let Some(disp) = variant_get_dispatch(variant) {
        Ok(DispatchObject { inner: disp })
    } else if variant_is_empty(variant) {
        Err(format!("'{context}' returned empty/null"))
    } else {
        let vt = variant_vt(variant);
        Err(format!(
            "'{context}' returned non-object VARIANT (VT={vt}), expected VT_DISPATCH"
        ))
    }
}

/// SAP GUI reports most failures as DISP_E_EXCEPTION with a readable
/// description ("The control could not be found by id.").
fn format_invoke_error(err: windows::core::Error, except: &EXCEPINFO, member_name: &str) -> String {
    if err.code() == DISP_E_EXCEPTION {
        let desc = if !except.bstrDescription.is_empty() {
            except.bstrDescription.to_string()
        } else {
            String::from("(no description)")
        };
        let source = if !except.bstrSource.is_empty() {
            except.bstrSource.to_string()
        } else {
            String::from("(no source)")
        };
        format!("COM exception in '{member_name}': {desc} (source: {source})")
    } else {
        format!("Invoke('{member_name}') failed: {err}")
    }
}
