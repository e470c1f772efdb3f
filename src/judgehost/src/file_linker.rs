//! Exposes selected files to sandboxes at fixed paths.
//!
//! A [`FileLinker`] owns a directory with a `read` and a `write` base. Files
//! are hard-linked into one of them under a short name, so a sandbox which
//! only sees the two bases can reach them without seeing the rest of the
//! filesystem.
use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::debug;

fn fs_extra_to_io(err: fs_extra::error::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

#[derive(Debug, Clone)]
pub struct FileBase {
    path: PathBuf,
    owner_gid: Option<u32>,
    group_writable: bool,
}

impl FileBase {
    pub fn new(path: impl Into<PathBuf>, owner_gid: Option<u32>, group_writable: bool) -> Self {
        FileBase {
            path: path.into(),
            owner_gid,
            group_writable,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fix_ownership(&self, path: &Path, dir: bool) -> io::Result<()> {
        if let Some(gid) = self.owner_gid {
            nix::unistd::chown(path, None, Some(nix::unistd::Gid::from_raw(gid)))
                .map_err(io::Error::from)?;
        }
        let mode = match (dir, self.group_writable) {
            (true, true) => 0o775,
            (true, false) => 0o755,
            (false, true) => 0o664,
            (false, false) => 0o644,
        };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    /// Creates the base directory (and parents) with configured ownership
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.path)?;
        self.fix_ownership(&self.path, true)
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, data)?;
        self.fix_ownership(&path, false)?;
        Ok(path)
    }
}

#[derive(Debug)]
pub struct FileLinker {
    read_base: FileBase,
    write_base: FileBase,
}

impl FileLinker {
    pub fn new(dir: &Path, owner_gid: Option<u32>) -> io::Result<FileLinker> {
        let read_base = FileBase::new(dir.join("read"), owner_gid, false);
        let write_base = FileBase::new(dir.join("write"), owner_gid, true);
        read_base.create()?;
        write_base.create()?;
        Ok(FileLinker {
            read_base,
            write_base,
        })
    }

    pub fn read_base(&self) -> &Path {
        self.read_base.path()
    }

    pub fn write_base(&self) -> &Path {
        self.write_base.path()
    }

    /// Path under which `name` is (or will be) visible. `"."` denotes the
    /// base directory itself.
    pub fn path_for(&self, name: &str, writable: bool) -> PathBuf {
        let base = if writable {
            self.write_base()
        } else {
            self.read_base()
        };
        if name == "." {
            base.to_path_buf()
        } else {
            base.join(name)
        }
    }

    /// Makes `source` visible as `name`, replacing any previous link.
    ///
    /// Read-only files living on another filesystem are copied instead;
    /// writable ones must be linked so that writes reach `source`.
    pub fn link_file(&self, source: &Path, name: &str, writable: bool) -> io::Result<()> {
        let dest = self.path_for(name, writable);
        match fs::remove_file(&dest) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        match fs::hard_link(source, &dest) {
            Ok(()) => Ok(()),
            Err(err) if !writable && err.raw_os_error() == Some(libc::EXDEV) => {
                debug!(
                    source = %source.display(),
                    "cross-device link, copying instead"
                );
                fs_extra::file::copy(source, &dest, &fs_extra::file::CopyOptions::new())
                    .map_err(fs_extra_to_io)?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Removes everything linked or written into both bases
    pub fn clear(&self) -> io::Result<()> {
        let mut items = Vec::new();
        for base in [self.read_base(), self.write_base()] {
            for entry in fs::read_dir(base)? {
                items.push(entry?.path());
            }
        }
        fs_extra::remove_items(&items).map_err(fs_extra_to_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_and_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let linker = FileLinker::new(&dir.path().join("env"), None).unwrap();
        let src = dir.path().join("data.in");
        fs::write(&src, "42\n").unwrap();

        linker.link_file(&src, "input", false).unwrap();
        assert_eq!(
            fs::read_to_string(linker.path_for("input", false)).unwrap(),
            "42\n"
        );
        // relinking replaces the previous file
        let other = dir.path().join("other.in");
        fs::write(&other, "7\n").unwrap();
        linker.link_file(&other, "input", false).unwrap();
        assert_eq!(
            fs::read_to_string(linker.path_for("input", false)).unwrap(),
            "7\n"
        );

        fs::write(linker.path_for("judgemessage.txt", true), "hi").unwrap();
        linker.clear().unwrap();
        assert_eq!(fs::read_dir(linker.read_base()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(linker.write_base()).unwrap().count(), 0);
        // sources survive clearing
        assert!(src.exists());
    }

    #[test]
    fn writes_reach_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let linker = FileLinker::new(&dir.path().join("env"), None).unwrap();
        let base = FileBase::new(dir.path().join("case"), None, true);
        base.create().unwrap();
        let out = base.write_file("output", b"").unwrap();
        linker.link_file(&out, "output", true).unwrap();
        fs::write(linker.path_for("output", true), "produced").unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "produced");
    }

    #[test]
    fn dot_is_base() {
        let dir = tempfile::TempDir::new().unwrap();
        let linker = FileLinker::new(dir.path(), None).unwrap();
        assert_eq!(linker.path_for(".", true), dir.path().join("write"));
        assert_eq!(linker.path_for(".", false), dir.path().join("read"));
    }
}
