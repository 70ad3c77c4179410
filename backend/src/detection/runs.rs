use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const RUN_PREFIX: &str = "predict";

/// Hands out fresh `predict`, `predict2`, `predict3`... directories under
/// `<root>/detect`. A directory is claimed with `create_dir`, so two callers
/// never receive the same one.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    pub fn new(runs_root: impl Into<PathBuf>) -> Self {
        Self {
            root: runs_root.into().join("detect"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn claim_next(&self) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let mut n: u32 = 1;
        loop {
            let candidate = if n == 1 {
                self.root.join(RUN_PREFIX)
            } else {
                self.root.join(format!("{}{}", RUN_PREFIX, n))
            };
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }
}
