//! Shared filesystem helpers built on `cap-std`, `camino` and `tempfile`.
//!
//! Writes never leave a half-written artefact at the destination: bytes are
//! staged in a temporary file next to the target and moved into place once
//! complete.
#![forbid(unsafe_code)]

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Write};
use std::path::MAIN_SEPARATOR_STR;
use tempfile::NamedTempFile;

/// Result of a create-only write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file did not exist and was written.
    Created,
    /// A file already occupied the path; nothing was written.
    AlreadyExists,
}

fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, &str)> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} has no file name")))?;
    let dir = fs_utf8::Dir::open_ambient_dir(parent_or_current(path), ambient_authority())?;
    Ok((dir, name))
}

/// Create every missing directory above `path`.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => return Ok(()),
    };
    let (base, rest) = anchor(parent)?;
    if rest.as_str().is_empty() {
        return Ok(());
    }
    base.create_dir_all(rest)
}

/// Return whether something already occupies `path`.
///
/// A missing parent directory counts as "does not exist".
pub fn path_exists(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(found) => found,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    match dir.symlink_metadata(name) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Write `bytes` to `path` only if nothing exists there yet.
///
/// The bytes are staged in a sibling temporary file and linked into place
/// without clobbering, so two writers racing for the same path produce exactly
/// one `Created`.
pub fn create_new_atomic(path: &Utf8Path, bytes: &[u8]) -> io::Result<WriteOutcome> {
    ensure_parent_dir(path)?;
    if path_exists(path)? {
        return Ok(WriteOutcome::AlreadyExists);
    }
    let staged = stage(path, bytes)?;
    match staged.persist_noclobber(path.as_std_path()) {
        Ok(_) => Ok(WriteOutcome::Created),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(WriteOutcome::AlreadyExists)
        }
        Err(err) => Err(err.error),
    }
}

/// Replace the contents of `path` with `bytes` in one rename.
pub fn replace_atomic(path: &Utf8Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let staged = stage(path, bytes)?;
    staged
        .persist(path.as_std_path())
        .map(|_| ())
        .map_err(|err| err.error)
}

fn stage(path: &Utf8Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let parent = parent_or_current(path);
    let mut staged = tempfile::Builder::new()
        .prefix(".fetchsink-")
        .suffix(".partial")
        .tempfile_in(parent.as_std_path())?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged.as_file().sync_all()?;
    Ok(staged)
}

fn parent_or_current(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

/// Split `dir` into an ambient directory cap-std can open (the filesystem
/// root, a Windows drive root, or `.`) and the path below it.
fn anchor(dir: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let mut components = dir.components();
    let root = match components.clone().next() {
        Some(Utf8Component::Prefix(prefix)) => {
            components.next();
            let mut root = Utf8PathBuf::from(prefix.as_str());
            if components.clone().next() == Some(Utf8Component::RootDir) {
                components.next();
                root.push(MAIN_SEPARATOR_STR);
            }
            root
        }
        Some(Utf8Component::RootDir) => {
            components.next();
            Utf8PathBuf::from(MAIN_SEPARATOR_STR)
        }
        _ => Utf8PathBuf::from("."),
    };
    let base = fs_utf8::Dir::open_ambient_dir(&root, ambient_authority())?;
    Ok((base, components.as_path().to_owned()))
}
