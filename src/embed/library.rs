use std::ffi::{CStr, CString, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use nix::libc;

use crate::error::EmbedError;

/// A shared library opened with global symbol visibility.
///
/// The handle is never closed: the runtime's callbacks and globals must stay
/// mapped until the process exits.
pub struct NativeLibrary {
    handle: NonNull<c_void>,
    path: PathBuf,
}

impl NativeLibrary {
    pub fn open(path: &Path) -> Result<Self, EmbedError> {
        if !path.exists() {
            return Err(EmbedError::LibraryNotFound(path.to_path_buf()));
        }

        let c_path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| EmbedError::InvalidArgument(path.display().to_string()))?;

        // SAFETY: c_path is a valid NUL-terminated string
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };

        match NonNull::new(handle) {
            Some(handle) => Ok(Self {
                handle,
                path: path.to_path_buf(),
            }),
            None => Err(EmbedError::LibraryLoad {
                path: path.to_path_buf(),
                reason: last_dl_error(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Address of an exported symbol
    pub fn symbol(&self, name: &str) -> Result<NonNull<c_void>, EmbedError> {
        let c_name =
            CString::new(name).map_err(|_| EmbedError::InvalidArgument(name.to_string()))?;
        // SAFETY: handle came from dlopen and is never closed
        let ptr = unsafe { libc::dlsym(self.handle.as_ptr(), c_name.as_ptr()) };
        NonNull::new(ptr).ok_or_else(|| EmbedError::MissingSymbol(name.to_string()))
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbol(name).is_ok()
    }

    /// Exported function as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type matching the
    /// symbol's real signature.
    pub unsafe fn function<F: Copy>(&self, name: &str) -> Result<F, EmbedError> {
        debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
        let ptr = self.symbol(name)?.as_ptr();
        // SAFETY: upheld by the caller
        Ok(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&ptr) })
    }

    /// Exported global variable of type `T`
    pub fn global<T>(&self, name: &str) -> Result<NonNull<T>, EmbedError> {
        Ok(self.symbol(name)?.cast())
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns NULL or a NUL-terminated string owned by libc
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}
