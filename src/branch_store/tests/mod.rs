//! Unit tests for the branch store and leases.

mod lease_tests;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};

/// Creates a fresh directory under the system temp dir.
pub(super) fn temp_dir(prefix: &str) -> Utf8PathBuf {
    let base = Utf8PathBuf::try_from(std::env::temp_dir()).expect("temp dir should be UTF-8");
    let name = format!("{prefix}_{}", uuid::Uuid::new_v4());
    let base_dir =
        Dir::open_ambient_dir(&base, ambient_authority()).expect("temp dir should open");
    base_dir.create_dir(&name).expect("temp subdir should be created");
    base.join(name)
}

pub(super) fn open(path: &Utf8PathBuf) -> Dir {
    Dir::open_ambient_dir(path, ambient_authority()).expect("directory should open")
}
