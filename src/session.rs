//! 수신측 전송 세션
//!
//! 진행 중인 전송 하나의 조립 상태. 슬롯 배열, 수신 수, 재시도 카운터를 가진다.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::chunk::{Chunk, Sequence};
use crate::message::{TransferHeader, TransferId};
use crate::{Error, Result};

/// 청크 수락 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// 빈 슬롯에 저장됨
    Stored,

    /// 이미 채워진 슬롯 (카운트 변화 없음)
    Duplicate,

    /// 다이제스트 불일치
    Corrupt,

    /// 순서 번호가 범위를 벗어남
    OutOfRange,
}

impl Accept {
    pub fn is_accepted(self) -> bool {
        matches!(self, Accept::Stored | Accept::Duplicate)
    }
}

/// 전송 세션
#[derive(Debug)]
pub struct Session {
    /// 송신자 주소
    pub peer: SocketAddr,

    pub transfer_id: TransferId,
    pub file_name: String,
    pub file_size: u64,

    /// 생성 시간
    pub created_at: Instant,

    /// 마지막으로 청크를 수락한 시간 (없으면 생성 시간)
    last_activity: Instant,

    /// 순서 번호별 페이로드
    slots: Vec<Option<Bytes>>,

    /// 채워진 슬롯 수 (항상 `slots`의 Some 개수와 같음)
    received_count: usize,

    /// 연속 스윕 횟수 (청크 수락 시 0으로 리셋)
    retry_count: u32,
}

impl Session {
    /// 전송 헤더로부터 빈 세션 생성
    pub fn new(peer: SocketAddr, header: &TransferHeader) -> Self {
        let now = Instant::now();
        Self {
            peer,
            transfer_id: header.transfer_id,
            file_name: header.file_name.clone(),
            file_size: header.file_size,
            created_at: now,
            last_activity: now,
            slots: vec![None; header.chunk_count as usize],
            received_count: 0,
            retry_count: 0,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.slots.len()
    }

    pub fn received_count(&self) -> usize {
        self.received_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// 스윕 한 번 기록
    pub fn bump_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    /// 마지막 수락 이후 경과 시간
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// 순서 번호가 이 세션 범위 안인지
    pub fn has_slot(&self, sequence: Sequence) -> bool {
        (sequence as usize) < self.slots.len()
    }

    /// 청크를 검증하고 슬롯에 저장
    pub fn accept_chunk(&mut self, chunk: &Chunk) -> Accept {
        let Some(slot) = self.slots.get_mut(chunk.sequence() as usize) else {
            return Accept::OutOfRange;
        };

        if !chunk.verify() {
            return Accept::Corrupt;
        }

        self.retry_count = 0;
        self.last_activity = Instant::now();
        if slot.is_some() {
            return Accept::Duplicate;
        }

        *slot = Some(chunk.data.clone());
        self.received_count += 1;
        Accept::Stored
    }

    /// 청크 수락 여부만 반환
    pub fn accept(&mut self, chunk: &Chunk) -> bool {
        self.accept_chunk(chunk).is_accepted()
    }

    /// 완료 여부 확인
    pub fn is_complete(&self) -> bool {
        self.received_count == self.slots.len()
    }

    /// 비어 있는 슬롯의 순서 번호 목록
    pub fn missing_sequences(&self) -> Vec<Sequence> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx as Sequence)
            .collect()
    }

    /// 수신률 계산
    pub fn receive_ratio(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.received_count as f64 / self.slots.len() as f64
    }

    /// 슬롯을 순서대로 이어 붙여 파일 데이터 생성
    pub fn assemble(&self) -> Result<Bytes> {
        if !self.is_complete() {
            return Err(Error::SessionIncomplete {
                transfer_id: self.transfer_id,
                missing_count: self.slots.len() - self.received_count,
            });
        }

        // file_size는 송신자가 보낸 값이므로 실제 받은 슬롯 크기로 할당
        let len = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut data = BytesMut::with_capacity(len);
        for payload in self.slots.iter().flatten() {
            data.extend_from_slice(payload);
        }
        Ok(data.freeze())
    }
}
