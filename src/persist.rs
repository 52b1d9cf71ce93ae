//! 완료된 전송 저장
//!
//! 수신자는 전송 하나가 완료될 때마다 `Persist::persist`를 한 번 호출한다.
//! 저장 실패는 로그만 남기고 세션 제거를 되돌리지 않는다.
//! 호출은 tokio 블로킹 풀에서 일어나므로 구현은 동기 IO를 써도 된다.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::info;

use crate::message::TransferId;
use crate::Result;

/// 조립이 끝난 전송
#[derive(Debug, Clone)]
pub struct CompletedTransfer {
    pub transfer_id: TransferId,
    pub file_name: String,
    pub data: Bytes,
}

/// 완료된 전송 저장소
pub trait Persist: Send + Sync {
    fn persist(&self, transfer: &CompletedTransfer) -> Result<()>;
}

impl<P: Persist + ?Sized> Persist for Box<P> {
    fn persist(&self, transfer: &CompletedTransfer) -> Result<()> {
        (**self).persist(transfer)
    }
}

/// 디렉터리에 파일로 저장
///
/// 파일명은 `<전송 ID 앞 6자리>-<기본 이름>`.
#[derive(Debug, Clone)]
pub struct DirectoryPersist {
    dir: PathBuf,
}

impl DirectoryPersist {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 저장될 경로 계산
    pub fn path_for(&self, transfer: &CompletedTransfer) -> PathBuf {
        // 송신자가 보낸 이름의 경로 부분은 버림
        let base = Path::new(&transfer.file_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());

        let id = transfer.transfer_id.simple().to_string();
        self.dir.join(format!("{}-{}", &id[..6], base))
    }
}

impl Default for DirectoryPersist {
    fn default() -> Self {
        Self::new("save")
    }
}

impl Persist for DirectoryPersist {
    fn persist(&self, transfer: &CompletedTransfer) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(transfer);
        fs::write(&path, &transfer.data)?;
        info!("Saved {} ({} bytes)", path.display(), transfer.data.len());
        Ok(())
    }
}

/// 메모리에 보관 (임베딩/테스트용)
///
/// 복제본끼리 같은 목록을 공유한다.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersist {
    completed: Arc<Mutex<Vec<CompletedTransfer>>>,
}

impl MemoryPersist {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 완료된 전송 목록
    pub fn completed(&self) -> Vec<CompletedTransfer> {
        self.completed.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.completed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.lock().is_empty()
    }
}

impl Persist for MemoryPersist {
    fn persist(&self, transfer: &CompletedTransfer) -> Result<()> {
        self.completed.lock().push(transfer.clone());
        Ok(())
    }
}

/// 저장하지 않음
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersist;

impl Persist for NullPersist {
    fn persist(&self, _transfer: &CompletedTransfer) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transfer(name: &str) -> CompletedTransfer {
        CompletedTransfer {
            transfer_id: Uuid::from_u128(0xabcdef12_3456_7890_abcd_ef1234567890),
            file_name: name.to_string(),
            data: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn test_directory_persist_writes_prefixed_file() {
        let dir = tempfile::tempdir().unwrap();
        let persist = DirectoryPersist::new(dir.path().join("save"));

        persist.persist(&transfer("notes.txt")).unwrap();

        let path = dir.path().join("save").join("abcdef-notes.txt");
        assert_eq!(fs::read(path).unwrap(), b"hello");
    }

    #[test]
    fn test_directory_persist_strips_path_components() {
        let persist = DirectoryPersist::new("/srv/save");
        let path = persist.path_for(&transfer("../../etc/passwd"));
        assert_eq!(path, PathBuf::from("/srv/save/abcdef-passwd"));
    }

    #[test]
    fn test_memory_persist_shares_between_clones() {
        let persist = MemoryPersist::new();
        let writer = persist.clone();

        writer.persist(&transfer("a")).unwrap();
        writer.persist(&transfer("b")).unwrap();

        assert_eq!(persist.len(), 2);
        assert_eq!(persist.completed()[1].file_name, "b");
    }
}
