//! Small filesystem helpers shared by the io modules.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Atomically write `contents` to `path` (temp file in the same dir + rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Atomically copy `src` over `dest`, producing an independent file.
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    let tmp_path = tmp_sibling(dest);
    fs::copy(src, &tmp_path)
        .with_context(|| format!("copy {} to {}", src.display(), tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| format!("replace {}", dest.display()))?;
    Ok(())
}

/// Hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = file
            .read(&mut chunk)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hidden temp name next to `path`: `dir/.name.tmp`.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_dir(path).join(format!(".{name}.tmp"))
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/out.txt");
        write_atomic(&path, b"hello").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "hello");
        assert!(!tmp_sibling(&path).exists());
    }

    #[test]
    fn copy_atomic_is_independent_of_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src.bin");
        let dest = temp.path().join("dest.bin");
        fs::write(&src, b"v1").expect("write");
        copy_atomic(&src, &dest).expect("copy");
        fs::remove_file(&src).expect("remove");
        assert_eq!(fs::read(&dest).expect("read"), b"v1");
    }

    #[test]
    fn sha256_of_known_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("abc.txt");
        fs::write(&path, b"abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
