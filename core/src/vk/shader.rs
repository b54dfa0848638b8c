//! SPIR-V module loading and validation: resolve a filename under a base
//! path, reject anything too small or misaligned to be SPIR-V, and check
//! the magic number before handing the words to Vulkan.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Directory SPIR-V modules are resolved against. On Android this is
/// conventionally `/data/local/tmp`; elsewhere the CLI front end defaults it
/// to the current working directory, but any caller can supply its own.
#[derive(Clone, Debug)]
pub struct ShaderSearchPath(PathBuf);

impl ShaderSearchPath {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        ShaderSearchPath(base.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Loads and validates a SPIR-V module named `filename`, relative to this
    /// search path.
    pub fn load(&self, filename: &str) -> Result<Vec<u32>> {
        let path = self.0.join(filename);
        info!(path = %path.display(), "loading shader");

        if !path.exists() {
            return Err(Error::ShaderNotFound(path));
        }

        let bytes = std::fs::read(&path).map_err(Error::OsError)?;
        parse_spirv(&path, &bytes)
    }
}

fn parse_spirv(path: &Path, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return Err(Error::InvalidSpirv(path.to_path_buf()));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    match words.first() {
        Some(&word) if word == SPIRV_MAGIC => Ok(words),
        _ => Err(Error::InvalidSpirv(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[test]
    fn rejects_too_small_file() {
        let dir = tempdir();
        std::fs::write(dir.path().join("tiny.spv"), [1, 2, 3]).unwrap();
        let search = ShaderSearchPath::new(dir.path());
        assert!(matches!(
            search.load("tiny.spv"),
            Err(Error::InvalidSpirv(_))
        ));
    }

    #[test]
    fn rejects_bad_magic_number() {
        let dir = tempdir();
        let bytes = words_to_bytes(&[0xDEAD_BEEF, 1, 2, 3]);
        std::fs::write(dir.path().join("bad.spv"), bytes).unwrap();
        let search = ShaderSearchPath::new(dir.path());
        assert!(matches!(
            search.load("bad.spv"),
            Err(Error::InvalidSpirv(_))
        ));
    }

    #[test]
    fn accepts_valid_magic_number() {
        let dir = tempdir();
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 12, 0]);
        std::fs::write(dir.path().join("ok.spv"), bytes).unwrap();
        let search = ShaderSearchPath::new(dir.path());
        let words = search.load("ok.spv").unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words.len(), 4);
    }

    #[test]
    fn missing_file_reports_shader_not_found() {
        let dir = tempdir();
        let search = ShaderSearchPath::new(dir.path());
        assert!(matches!(
            search.load("nope.spv"),
            Err(Error::ShaderNotFound(_))
        ));
    }

    // Minimal scratch-directory helper; avoids pulling in a dev-dependency
    // just for a handful of filesystem tests.
    fn tempdir() -> TempDir {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "substrate-shader-test-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&path).unwrap();
        TempDir(path)
    }

    struct TempDir(PathBuf);

    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
