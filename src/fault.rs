//! 송신 경로 장애 주입
//!
//! 최초 전송 단계(TRANSMIT)에서만 적용된다. 재전송 요청에 대한 응답은
//! 항상 그대로 보낸다. 기본값 `NeverDrop`은 아무것도 버리지 않는다.

use std::collections::HashSet;

use rand::Rng;

use crate::chunk::{Chunk, Sequence};

/// 청크 전송을 생략할지 결정하는 정책
pub trait DropPolicy: Send + Sync {
    fn should_drop(&self, chunk: &Chunk) -> bool;
}

/// 장애 없음
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverDrop;

impl DropPolicy for NeverDrop {
    fn should_drop(&self, _chunk: &Chunk) -> bool {
        false
    }
}

/// 확률 `probability`로 청크를 버림
#[derive(Debug, Clone, Copy)]
pub struct RandomDrop {
    probability: f64,
}

impl RandomDrop {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl DropPolicy for RandomDrop {
    fn should_drop(&self, _chunk: &Chunk) -> bool {
        self.probability > 0.0 && rand::thread_rng().gen_bool(self.probability)
    }
}

/// 지정한 순서 번호의 청크를 항상 버림
#[derive(Debug, Clone, Default)]
pub struct DropSequences {
    sequences: HashSet<Sequence>,
}

impl DropSequences {
    pub fn new(sequences: impl IntoIterator<Item = Sequence>) -> Self {
        Self {
            sequences: sequences.into_iter().collect(),
        }
    }
}

impl DropPolicy for DropSequences {
    fn should_drop(&self, chunk: &Chunk) -> bool {
        self.sequences.contains(&chunk.sequence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use uuid::Uuid;

    fn chunk(sequence: Sequence) -> Chunk {
        Chunk::new(Uuid::new_v4(), sequence, Bytes::from_static(b"x"))
    }

    #[test]
    fn test_random_drop_extremes() {
        let never = RandomDrop::new(0.0);
        let always = RandomDrop::new(1.0);
        for seq in 0..100 {
            assert!(!never.should_drop(&chunk(seq)));
            assert!(always.should_drop(&chunk(seq)));
        }
        assert_eq!(RandomDrop::new(7.0).probability(), 1.0);
    }

    #[test]
    fn test_drop_sequences() {
        let policy = DropSequences::new([3, 5]);
        assert!(policy.should_drop(&chunk(3)));
        assert!(policy.should_drop(&chunk(5)));
        assert!(!policy.should_drop(&chunk(4)));
        assert!(!NeverDrop.should_drop(&chunk(3)));
    }
}
