
use crate::config::ScriptConfig;
use crate::scripting::runtime::ScriptRuntime;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

static RUNTIME_TESTS: Mutex<()> = Mutex::new(());

/// Held by every test that starts a runtime, since only one may be live
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    RUNTIME_TESTS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A started runtime searching a scratch directory
///
/// Fields drop in order, so the runtime shuts down before the next test can
/// start its own.
pub(super) struct Scratch {
    pub(super) runtime: ScriptRuntime,
    pub(super) dir: TempDir,
    _serial: MutexGuard<'static, ()>,
}

/// Write `files` under a scratch directory and start a runtime searching it
pub(super) fn runtime_with(files: &[(&str, &str)]) -> Scratch {
    let serial = serial();
    let dir = tempfile::tempdir().unwrap();
    for (name, source) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, source).unwrap();
    }

    let mut runtime = ScriptRuntime::new();
    runtime
        .initialize(&ScriptConfig::new([dir.path()]), &[], None)
        .unwrap();
    Scratch {
        runtime,
        dir,
        _serial: serial,
    }
}
