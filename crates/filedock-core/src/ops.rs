//! Recursive file-tree operations: copy, delete, move.
//!
//! Tree walks use explicit worklists instead of language recursion, so depth
//! is bounded by heap and cancellation points fall between iterations.
//!
//! Failure semantics: copy is purely additive and may leave a partial
//! destination tree behind on mid-tree failure (documented limitation, no
//! rollback). A cross-device move that copies successfully but fails to
//! delete the source reports [`OpError::MoveAbortedAfterCopy`] so the caller
//! knows the data exists in both places.

use crate::error::{OpError, OpResult};
use crate::path::{probe, PathProbe};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Default copy/stream chunk size (128 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Copy, delete and move of files and directory trees.
#[derive(Debug, Clone)]
pub struct FileOps {
    chunk_size: usize,
}

/// One pending step of an iterative move.
enum MoveTask {
    /// Move a single entry, with the device id of the nearest enclosing
    /// destination directory as fallback for the rename-vs-copy decision.
    Transfer {
        from: PathBuf,
        to: PathBuf,
        ctx_dev: Option<u64>,
    },
    /// Remove a source directory whose children have all been moved out.
    /// Pushed before the children so the stack pops it after them.
    RemoveSourceDir(PathBuf),
}

impl Default for FileOps {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl FileOps {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Copy a file or directory tree. Never deletes the source.
    ///
    /// Directory source: `to` is created (with parents) if absent and must
    /// be a directory otherwise. File source: an existing directory at `to`
    /// places the file at `to/<basename(from)>`; an absent `to` gets its
    /// parent created.
    pub async fn copy(&self, from: &Path, to: &Path) -> OpResult<()> {
        match probe(from).await? {
            PathProbe::Absent => Err(OpError::missing_source(from)),
            PathProbe::Dir(_) => self.copy_tree(from, to).await,
            PathProbe::File(_) => self.copy_file(from, to).await,
        }
    }

    async fn copy_tree(&self, from: &Path, to: &Path) -> OpResult<()> {
        let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src, dst)) = pending.pop() {
            match probe(&dst).await? {
                PathProbe::Dir(_) => {}
                PathProbe::File(_) => {
                    return Err(OpError::DestinationConflict {
                        path: dst.display().to_string(),
                    });
                }
                PathProbe::Absent => {
                    fs::create_dir_all(&dst)
                        .await
                        .map_err(|e| OpError::access_denied(&dst, e))?;
                }
            }

            let mut rd = fs::read_dir(&src)
                .await
                .map_err(|e| OpError::access_denied(&src, e))?;
            while let Some(entry) = rd
                .next_entry()
                .await
                .map_err(|e| OpError::access_denied(&src, e))?
            {
                let name = entry.file_name();
                let child_src = src.join(&name);
                let child_dst = dst.join(&name);
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| OpError::stat_failed(&child_src, e))?;
                if file_type.is_dir() {
                    pending.push((child_src, child_dst));
                } else {
                    self.copy_file_exact(&child_src, &child_dst).await?;
                }
            }
        }
        Ok(())
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> OpResult<()> {
        let target = match probe(to).await? {
            PathProbe::Dir(_) => {
                let basename = from.file_name().ok_or_else(|| {
                    OpError::io(
                        from,
                        io::Error::new(io::ErrorKind::InvalidInput, "source has no basename"),
                    )
                })?;
                to.join(basename)
            }
            PathProbe::File(_) => to.to_path_buf(),
            PathProbe::Absent => {
                if let Some(parent) = to.parent()
                    && !parent.as_os_str().is_empty()
                    && !probe(parent).await?.exists()
                {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| OpError::access_denied(parent, e))?;
                }
                to.to_path_buf()
            }
        };
        self.copy_file_exact(from, &target).await
    }

    /// Stream one file's bytes in fixed-size chunks.
    ///
    /// The write loop retries until every byte read in a chunk is confirmed
    /// written; a write of zero bytes is an error, not completion. This is
    /// the invariant that prevents silent truncation on short writes.
    async fn copy_file_exact(&self, from: &Path, to: &Path) -> OpResult<()> {
        let mut src = fs::File::open(from)
            .await
            .map_err(|e| OpError::access_denied(from, e))?;
        let mut dst = fs::File::create(to)
            .await
            .map_err(|e| OpError::access_denied(to, e))?;

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = src.read(&mut buf).await.map_err(|e| OpError::io(from, e))?;
            if n == 0 {
                break;
            }

            let mut written = 0;
            while written < n {
                let w = dst
                    .write(&buf[written..n])
                    .await
                    .map_err(|e| OpError::io(to, e))?;
                if w == 0 {
                    return Err(OpError::io(
                        to,
                        io::Error::new(
                            io::ErrorKind::WriteZero,
                            "destination accepted zero bytes",
                        ),
                    ));
                }
                written += w;
            }
        }
        dst.flush().await.map_err(|e| OpError::io(to, e))?;
        Ok(())
    }

    /// Delete a file, or a directory tree in strict post-order.
    pub async fn delete(&self, path: &Path) -> OpResult<()> {
        match probe(path).await? {
            PathProbe::Absent => Err(OpError::missing_source(path)),
            PathProbe::File(_) => fs::remove_file(path)
                .await
                .map_err(|e| OpError::io(path, e)),
            PathProbe::Dir(_) => {
                // (dir, visited): a dir is pushed unvisited, its children are
                // deleted, then it pops again visited and gets removed empty.
                let mut stack: Vec<(PathBuf, bool)> = vec![(path.to_path_buf(), false)];

                while let Some((dir, visited)) = stack.pop() {
                    if visited {
                        fs::remove_dir(&dir).await.map_err(|e| OpError::io(&dir, e))?;
                        continue;
                    }
                    stack.push((dir.clone(), true));

                    let mut rd = fs::read_dir(&dir)
                        .await
                        .map_err(|e| OpError::access_denied(&dir, e))?;
                    while let Some(entry) = rd
                        .next_entry()
                        .await
                        .map_err(|e| OpError::access_denied(&dir, e))?
                    {
                        let child = entry.path();
                        let file_type = entry
                            .file_type()
                            .await
                            .map_err(|e| OpError::stat_failed(&child, e))?;
                        if file_type.is_dir() {
                            stack.push((child, false));
                        } else {
                            fs::remove_file(&child)
                                .await
                                .map_err(|e| OpError::io(&child, e))?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Move an entry to an exact destination path.
    ///
    /// Three-way branch, re-entrant through the worklist:
    /// - destination absent: atomic rename when source and the destination's
    ///   parent share a device, copy + delete otherwise;
    /// - destination is a directory and so is the source: merge children one
    ///   by one, then remove the emptied source directory;
    /// - destination is a file: rename-overwrite on the same device, copy +
    ///   delete across devices.
    ///
    /// `ctx_dev` is the device id of the nearest enclosing destination
    /// directory; it decides rename-vs-copy when the destination itself
    /// cannot be stat-ed.
    pub async fn move_entry(&self, from: &Path, to: &Path, ctx_dev: Option<u64>) -> OpResult<()> {
        let mut tasks = vec![MoveTask::Transfer {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            ctx_dev,
        }];

        while let Some(task) = tasks.pop() {
            match task {
                MoveTask::RemoveSourceDir(dir) => {
                    fs::remove_dir(&dir).await.map_err(|e| OpError::io(&dir, e))?;
                }
                MoveTask::Transfer { from, to, ctx_dev } => {
                    self.transfer(&mut tasks, &from, &to, ctx_dev).await?;
                }
            }
        }
        Ok(())
    }

    async fn transfer(
        &self,
        tasks: &mut Vec<MoveTask>,
        from: &Path,
        to: &Path,
        ctx_dev: Option<u64>,
    ) -> OpResult<()> {
        let (from_dev, from_is_dir) = match probe(from).await? {
            PathProbe::Absent => return Err(OpError::missing_source(from)),
            PathProbe::Dir(meta) => (meta.dev(), true),
            PathProbe::File(meta) => (meta.dev(), false),
        };

        // A destination that cannot be stat-ed falls back to the enclosing
        // directory's device id for the rename-vs-copy decision.
        let to_probe = match probe(to).await {
            Ok(p) => p,
            Err(_) => {
                return self.relocate(from, to, from_dev, ctx_dev).await;
            }
        };

        match to_probe {
            PathProbe::Absent => {
                let dest_dev = match to.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => {
                        match probe(parent).await {
                            Ok(PathProbe::Dir(meta)) => Some(meta.dev()),
                            _ => None,
                        }
                    }
                    _ => None,
                }
                .or(ctx_dev);
                self.relocate(from, to, from_dev, dest_dev).await
            }
            PathProbe::Dir(to_meta) => {
                if !from_is_dir {
                    return Err(OpError::DestinationConflict {
                        path: to.display().to_string(),
                    });
                }

                // Merge: children first, then the emptied source directory.
                debug!(from = %from.display(), to = %to.display(), "merging directory move");
                tasks.push(MoveTask::RemoveSourceDir(from.to_path_buf()));

                let dest_dev = Some(to_meta.dev());
                let mut rd = fs::read_dir(from)
                    .await
                    .map_err(|e| OpError::access_denied(from, e))?;
                while let Some(entry) = rd
                    .next_entry()
                    .await
                    .map_err(|e| OpError::access_denied(from, e))?
                {
                    let name = entry.file_name();
                    tasks.push(MoveTask::Transfer {
                        from: from.join(&name),
                        to: to.join(&name),
                        ctx_dev: dest_dev,
                    });
                }
                Ok(())
            }
            PathProbe::File(to_meta) => {
                if from_is_dir {
                    return Err(OpError::DestinationConflict {
                        path: to.display().to_string(),
                    });
                }
                // Same-name collision: the destination file is replaced.
                self.relocate(from, to, from_dev, Some(to_meta.dev())).await
            }
        }
    }

    /// Move one entry wholesale: rename on the same device, copy + delete
    /// across devices (or when the destination device is unknown).
    async fn relocate(
        &self,
        from: &Path,
        to: &Path,
        from_dev: u64,
        dest_dev: Option<u64>,
    ) -> OpResult<()> {
        if dest_dev == Some(from_dev) {
            return fs::rename(from, to).await.map_err(|e| OpError::io(from, e));
        }

        debug!(from = %from.display(), to = %to.display(), "cross-device move, copying then deleting");
        self.copy(from, to).await?;
        if let Err(e) = self.delete(from).await {
            return Err(OpError::MoveAbortedAfterCopy {
                from: from.display().to_string(),
                source: Box::new(e),
            });
        }
        Ok(())
    }
}
