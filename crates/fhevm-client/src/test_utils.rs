//! In-memory encryption engine for tests
//!
//! Handles are deterministic 32-byte values laid out as
//! `[context tag:20][index:1][bits:1][pad:2][value low 64 bits:8]`, which lets
//! tests check ordering and values without real FHE.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::keccak256;
use async_trait::async_trait;
use fhevm_core::{Address, Bytes, EncryptedType, EncryptionContext, Handle};

use crate::engine::{
    EncryptedInput, EncryptedInputBuilder, EngineError, EngineParams, EngineProvider, FheEngine,
};

/// Index of the value inside its buffer
pub fn mock_handle_index(handle: &Handle) -> usize {
    handle[20] as usize
}

/// Low 64 bits of the encrypted plaintext
pub fn mock_handle_value(handle: &Handle) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&handle[24..32]);
    u64::from_be_bytes(word)
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    finalized: AtomicUsize,
}

/// Deterministic engine that records how it is used
pub struct MockEngine {
    public_key: Bytes,
    reject: Option<EncryptedType>,
    counters: Arc<Counters>,
}

impl MockEngine {
    pub fn new(public_key: Bytes) -> Self {
        Self {
            public_key,
            reject: None,
            counters: Arc::default(),
        }
    }

    /// Make the engine refuse values of `ty`
    pub fn rejecting(mut self, ty: EncryptedType) -> Self {
        self.reject = Some(ty);
        self
    }

    pub fn inputs_created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn inputs_finalized(&self) -> usize {
        self.counters.finalized.load(Ordering::SeqCst)
    }
}

impl FheEngine for MockEngine {
    fn create_input(&self, context: &EncryptionContext) -> Box<dyn EncryptedInputBuilder> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);

        let mut tag_src = Vec::with_capacity(40);
        tag_src.extend_from_slice(context.contract_address.as_slice());
        tag_src.extend_from_slice(context.user_address.as_slice());
        let digest = keccak256(&tag_src);

        let mut tag = [0u8; 20];
        tag.copy_from_slice(&digest[..20]);

        Box::new(MockInput {
            tag,
            values: Vec::new(),
            reject: self.reject,
            counters: self.counters.clone(),
        })
    }

    fn public_key(&self, _address: &Address) -> Option<Bytes> {
        Some(self.public_key.clone())
    }
}

struct MockInput {
    tag: [u8; 20],
    values: Vec<(EncryptedType, u64)>,
    reject: Option<EncryptedType>,
    counters: Arc<Counters>,
}

impl MockInput {
    fn push(&mut self, ty: EncryptedType, low: u64) -> Result<(), EngineError> {
        if self.reject == Some(ty) {
            return Err(EngineError::new(format!("engine rejected {ty} value")));
        }
        if self.values.len() >= u8::MAX as usize {
            return Err(EngineError::new("too many values in one input"));
        }
        self.values.push((ty, low));
        Ok(())
    }
}

impl EncryptedInputBuilder for MockInput {
    fn add_bool(&mut self, value: bool) -> Result<(), EngineError> {
        self.push(EncryptedType::Bool, value as u64)
    }

    fn add_u8(&mut self, value: u8) -> Result<(), EngineError> {
        self.push(EncryptedType::Uint8, value as u64)
    }

    fn add_u16(&mut self, value: u16) -> Result<(), EngineError> {
        self.push(EncryptedType::Uint16, value as u64)
    }

    fn add_u32(&mut self, value: u32) -> Result<(), EngineError> {
        self.push(EncryptedType::Uint32, value as u64)
    }

    fn add_u64(&mut self, value: u64) -> Result<(), EngineError> {
        self.push(EncryptedType::Uint64, value)
    }

    fn add_u128(&mut self, value: u128) -> Result<(), EngineError> {
        self.push(EncryptedType::Uint128, value as u64)
    }

    fn add_address(&mut self, value: Address) -> Result<(), EngineError> {
        let mut low = [0u8; 8];
        low.copy_from_slice(&value.as_slice()[12..]);
        self.push(EncryptedType::Address, u64::from_be_bytes(low))
    }

    fn encrypt(self: Box<Self>) -> Result<EncryptedInput, EngineError> {
        let handles: Vec<Handle> = self
            .values
            .iter()
            .enumerate()
            .map(|(index, (ty, low))| {
                let mut handle = [0u8; 32];
                handle[..20].copy_from_slice(&self.tag);
                handle[20] = index as u8;
                handle[21] = ty.bits() as u8;
                handle[24..].copy_from_slice(&low.to_be_bytes());
                Bytes::copy_from_slice(&handle)
            })
            .collect();

        let mut proof = vec![handles.len() as u8];
        let concatenated: Vec<u8> = handles.iter().flat_map(|h| h.iter().copied()).collect();
        proof.extend_from_slice(keccak256(&concatenated).as_slice());

        self.counters.finalized.fetch_add(1, Ordering::SeqCst);

        Ok(EncryptedInput {
            handles,
            input_proof: Bytes::from(proof),
        })
    }
}

/// Engine provider with call counting, optional latency and failure injection
#[derive(Default)]
pub struct MockEngineProvider {
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
    reject: Option<EncryptedType>,
    last_params: Mutex<Option<EngineParams>>,
}

impl MockEngineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` engine creations
    pub fn with_failures(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Sleep before answering, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn rejecting(mut self, ty: EncryptedType) -> Self {
        self.reject = Some(ty);
        self
    }

    /// Number of `create_engine` calls so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<EngineParams> {
        self.last_params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EngineProvider for MockEngineProvider {
    async fn create_engine(&self, params: EngineParams) -> Result<Arc<dyn FheEngine>, EngineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        *self
            .last_params
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(params.clone());

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EngineError::new("mock engine failed to load key material"));
        }

        let mut engine = MockEngine::new(params.public_key);
        if let Some(ty) = self.reject {
            engine = engine.rejecting(ty);
        }
        Ok(Arc::new(engine))
    }
}
