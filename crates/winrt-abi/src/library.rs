//! Native library and symbol lookup

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libffi::middle::CodePtr;
use libloading::{Library, Symbol};
use log::debug;

use crate::error::{AbiError, Result};

/// A loaded native library.
pub struct NativeLibrary {
    name: String,
    library: Library,
}

impl NativeLibrary {
    /// Open `name`, trying the exact name first and then the platform extensions.
    pub fn open(name: impl AsRef<Path>) -> Result<Self> {
        let name = name.as_ref();
        let display = name.display().to_string();

        let mut last_error = None;
        for candidate in candidate_paths(name) {
            // SAFETY: loading runs the library's initializers; callers opt in by name.
            match unsafe { Library::new(&candidate) } {
                Ok(library) => {
                    debug!("loaded native library {}", candidate.display());
                    return Ok(Self {
                        name: display,
                        library,
                    });
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(AbiError::LibraryLoad {
            name: display,
            reason: last_error.unwrap_or_else(|| "no candidate paths".into()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an exported function and copy its pointer out as `F`.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the export's real signature.
    pub unsafe fn function<F: Copy>(&self, symbol: &str) -> Result<F> {
        let sym: Symbol<F> = unsafe { self.library.get(symbol.as_bytes()) }.map_err(|_| {
            AbiError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            }
        })?;
        Ok(*sym)
    }

    /// Look up an exported function as an untyped code pointer for libffi calls.
    pub fn code_ptr(&self, symbol: &str) -> Result<CodePtr> {
        // SAFETY: the pointer is only handed to libffi, never called through this type.
        let raw = unsafe { self.function::<*mut c_void>(symbol)? };
        if raw.is_null() {
            return Err(AbiError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            });
        }
        Ok(CodePtr::from_ptr(raw))
    }
}

fn candidate_paths(name: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![name.to_path_buf()];
    if name.extension().is_some() {
        return candidates;
    }

    #[cfg(target_os = "linux")]
    let extensions = &["so", "dll", "dylib"];
    #[cfg(target_os = "macos")]
    let extensions = &["dylib", "so", "dll"];
    #[cfg(target_os = "windows")]
    let extensions = &["dll", "so", "dylib"];
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    let extensions = &["so", "dll", "dylib"];

    candidates.extend(extensions.iter().map(|ext| name.with_extension(ext)));
    candidates
}
