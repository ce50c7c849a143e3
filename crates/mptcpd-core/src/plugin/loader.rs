//! Shared-object plugin loading.
//!
//! Mirrors the shape of a typical dynamic-provider loader: scan a
//! directory for loadable objects, resolve one exported symbol per file,
//! invoke it, and keep every [`Library`] alive for as long as its function
//! pointers might be called.

use std::ffi::CStr;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{info, warn};

use super::abi::{PLUGIN_REGISTER_SYMBOL, PluginRegisterFn};
use super::registry::PluginRegistry;
use crate::error::{Error, Result};

const PLUGIN_EXTENSION: &str = "so";

/// Reject a plugin directory that is missing, not a directory, or
/// world-writable (owner/group write is fine; anyone-write is not).
///
/// This is a fast up-front check for a clear startup error message.
/// [`scan_and_register`] repeats the check against an already-open
/// directory handle, since a check-then-open here could race a directory
/// swap underneath it.
pub fn validate_dir(dir: &Path) -> Result<()> {
    let meta = std::fs::metadata(dir).map_err(|e| {
        Error::Configuration(format!("plugin directory {}: {e}", dir.display()))
    })?;

    check_metadata(dir, &meta)
}

fn check_metadata(dir: &Path, meta: &std::fs::Metadata) -> Result<()> {
    if !meta.is_dir() {
        return Err(Error::Configuration(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    if meta.permissions().mode() & 0o002 != 0 {
        return Err(Error::Configuration(format!(
            "{} is world-writable",
            dir.display()
        )));
    }

    Ok(())
}

/// Scan `dir` for `.so` files, invoke each one's registration hook, and
/// register the result into `registry`.
///
/// Opens the directory once and validates and enumerates through that same
/// handle, so a directory swapped in between the initial [`validate_dir`]
/// check and this call can't smuggle a world-writable directory past the
/// permission check.
///
/// Returns the opened [`Library`] handles; the caller must keep them alive
/// for as long as any registered function pointer might be invoked.
pub fn scan_and_register(dir: &Path, registry: &mut PluginRegistry) -> Result<Vec<Library>> {
    let mut libraries = Vec::new();

    let handle = File::open(dir)
        .map_err(|e| Error::Configuration(format!("opening {}: {e}", dir.display())))?;
    let meta = handle
        .metadata()
        .map_err(|e| Error::Configuration(format!("statting {}: {e}", dir.display())))?;
    check_metadata(dir, &meta)?;

    // Enumerate through the fd we just validated rather than the path, so
    // nothing can be swapped in between the check above and here.
    let proc_path = PathBuf::from(format!("/proc/self/fd/{}", handle.as_raw_fd()));
    let entries = std::fs::read_dir(&proc_path)
        .map_err(|e| Error::Configuration(format!("reading {}: {e}", dir.display())))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| Error::Configuration(format!("reading {}: {e}", dir.display())))?;
        // Report and open by the real path, not the /proc/self/fd alias.
        let path = dir.join(entry.file_name());

        if path.extension().and_then(|ext| ext.to_str()) != Some(PLUGIN_EXTENSION) {
            continue;
        }

        match load_one(&path, registry) {
            Ok(library) => libraries.push(library),
            Err(e) => warn!(plugin = %path.display(), error = %e, "skipping plugin"),
        }
    }

    Ok(libraries)
}

fn load_one(path: &Path, registry: &mut PluginRegistry) -> Result<Library> {
    // SAFETY: loading and running arbitrary shared objects is inherently
    // unsafe; plugins are trusted code by design (see the daemon's error
    // handling notes on plugin misbehavior).
    let library = unsafe { Library::new(path) }.map_err(|e| Error::PluginLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let register: libloading::Symbol<PluginRegisterFn> =
        unsafe { library.get(PLUGIN_REGISTER_SYMBOL) }.map_err(|e| Error::PluginLoad {
            path: path.display().to_string(),
            reason: format!("missing {} symbol: {e}", String::from_utf8_lossy(PLUGIN_REGISTER_SYMBOL)),
        })?;

    let registration = unsafe { register() };

    if registration.name.is_null() {
        return Err(Error::PluginLoad {
            path: path.display().to_string(),
            reason: "registration returned a null name".into(),
        });
    }

    // SAFETY: the plugin contract requires `name` to be a NUL-terminated
    // string valid for the process lifetime.
    let name = unsafe { CStr::from_ptr(registration.name) }
        .to_string_lossy()
        .into_owned();

    let nm_ops = if registration.nm_ops.is_null() {
        None
    } else {
        // SAFETY: non-null per the plugin contract; the struct is plain
        // data (function pointers), so a bitwise copy is sound.
        Some(unsafe { std::ptr::read(registration.nm_ops) })
    };

    info!(plugin = %name, path = %path.display(), "loaded plugin");
    registry.register(name, registration.ops, nm_ops);

    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_rejected() {
        let err = validate_dir(Path::new("/nonexistent/mptcpd-plugins")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn plain_file_is_rejected_as_not_a_directory() {
        let tmp = std::env::temp_dir().join("mptcpd-core-loader-test-file");
        std::fs::write(&tmp, b"").unwrap();
        let err = validate_dir(&tmp).unwrap_err();
        std::fs::remove_file(&tmp).ok();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
