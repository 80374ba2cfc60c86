use anyhow::{Context, Result, bail};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tally_core::Upload;
use tally_finance::pipeline::UploadObserver;
use tracing::warn;
use uuid::Uuid;

/// `$TALLY_HOME`, or `~/.tally`.
pub fn tally_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TALLY_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tally"))
}

pub fn ensure_tally_home() -> Result<PathBuf> {
    let dir = tally_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// One JSON document per upload under `<home>/uploads/`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(ensure_tally_home()?.join("uploads"))
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write via a temp file + rename so readers never see a partial document.
    pub fn save(&self, upload: &Upload) -> Result<()> {
        let path = self.path_for(upload.id);
        let tmp = self.dir.join(format!(".{}.json.tmp", upload.id));
        let json = serde_json::to_vec_pretty(upload)?;

        let mut f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(&json)
            .and_then(|_| f.sync_all())
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename into {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<Upload> {
        let path = self.path_for(id);
        if !path.exists() {
            bail!("no upload with id {id}");
        }
        read_upload(&path)
    }

    /// Newest first.
    pub fn list(&self) -> Result<Vec<Upload>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))? {
            let path = entry?.path();
            let is_doc = path.extension().is_some_and(|e| e == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_doc {
                continue;
            }
            match read_upload(&path) {
                Ok(u) => out.push(u),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable upload file"),
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Remove an upload with its transactions, summary and insight.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let path = self.path_for(id);
        if !path.exists() {
            bail!("no upload with id {id}");
        }
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    }
}

fn read_upload(path: &Path) -> Result<Upload> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

impl UploadObserver for UploadStore {
    fn on_transition(&self, upload: &Upload) {
        if let Err(e) = self.save(upload) {
            warn!(upload = %upload.id, error = %e, "failed to persist upload state");
        }
    }
}
