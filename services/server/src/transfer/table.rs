//! pin 表与配对状态机。
//!
//! 状态：`Empty -> OneSide -> BothSides(配对并互换) -> Empty ... -> 过期移除`。
//! 表锁为同步锁，只在内存操作期间持有，从不跨 `.await`。

use std::{
    collections::HashMap,
    fmt::Write as _,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use axum::{body::Body, http::StatusCode};
use blake2::{Blake2b, Digest, digest::consts::U8};
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, info, warn};
use ts_shared_protocol::TransferRole;
use uuid::Uuid;

use crate::api::{
    error::ApiError,
    types::{MAX_PENDING_PINS, PIN_BYTES, TRANSFER_IDLE_TIMEOUT},
};

/// 转移失败原因。
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum TransferError {
    TooManyPending,
    UnknownPin,
    RoleTaken,
    Expired,
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::TooManyPending => ApiError::new(
                StatusCode::from_u16(509).unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                "TOO_MANY_TRANSFERS",
                "Too many transfer requests in progress",
            ),
            TransferError::UnknownPin => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST_PARAMETERS",
                "Invalid request parameters",
            ),
            TransferError::RoleTaken => ApiError::new(
                StatusCode::CONFLICT,
                "TRANSFER_ROLE_TAKEN",
                "Transfer role already attached",
            ),
            TransferError::Expired => {
                ApiError::new(StatusCode::GONE, "TRANSFER_EXPIRED", "Transfer pin expired")
            }
        }
    }
}

/// 配对成功后交给一方的响应：当前计数与对方的请求体。
pub(crate) struct RelayLeg {
    pub(crate) step: u64,
    pub(crate) body: Body,
}

pub(crate) type RelayReceiver = oneshot::Receiver<Result<RelayLeg, TransferError>>;
type RelayReply = oneshot::Sender<Result<RelayLeg, TransferError>>;

/// 已到达、等待对方的一侧。
struct WaitingSide {
    role: TransferRole,
    body: Body,
    reply: RelayReply,
}

impl WaitingSide {
    /// 请求方断开后，handler future 被丢弃，接收端随之关闭。
    fn is_gone(&self) -> bool {
        self.reply.is_closed()
    }
}

#[derive(Default)]
enum TransferSlots {
    #[default]
    Empty,
    OneSide(WaitingSide),
    BothSides(WaitingSide, WaitingSide),
}

impl TransferSlots {
    /// 放入新到达的一侧。已断开的一侧直接丢弃；同角色仍在线时原样退回并拒绝。
    fn attach(self, side: WaitingSide) -> Result<Self, (Self, TransferError)> {
        match self {
            TransferSlots::Empty => Ok(TransferSlots::OneSide(side)),
            TransferSlots::OneSide(current) if current.is_gone() => {
                debug!(
                    gone = current.role.as_str(),
                    role = side.role.as_str(),
                    "dropping disconnected transfer side"
                );
                Ok(TransferSlots::OneSide(side))
            }
            TransferSlots::OneSide(current) if current.role != side.role => {
                Ok(TransferSlots::BothSides(current, side))
            }
            occupied => Err((occupied, TransferError::RoleTaken)),
        }
    }
}

struct PendingTransfer {
    step: u64,
    slots: TransferSlots,
    timer: AbortHandle,
    generation: u64,
}

struct TransferInner {
    pending: HashMap<String, PendingTransfer>,
    seed: [u8; PIN_BYTES],
    next_generation: u64,
}

impl TransferInner {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.wrapping_add(1);
        self.next_generation
    }

    /// 以 BLAKE2b(8 字节输出) 推进种子，hex 作为 pin。
    fn ratchet_pin(&mut self) -> String {
        let next = Blake2b::<U8>::digest(self.seed);
        self.seed.copy_from_slice(&next);
        let mut pin = String::with_capacity(PIN_BYTES * 2);
        for byte in self.seed {
            let _ = write!(&mut pin, "{byte:02x}");
        }
        pin
    }
}

/// 进程内 pin 表句柄。
#[derive(Clone)]
pub(crate) struct TransferTable {
    inner: Arc<Mutex<TransferInner>>,
}

impl Default for TransferTable {
    fn default() -> Self {
        let mut seed = [0u8; PIN_BYTES];
        seed.copy_from_slice(&Uuid::new_v4().as_bytes()[..PIN_BYTES]);
        Self {
            inner: Arc::new(Mutex::new(TransferInner {
                pending: HashMap::new(),
                seed,
                next_generation: 0,
            })),
        }
    }
}

impl TransferTable {
    fn lock(&self) -> MutexGuard<'_, TransferInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 申请新 pin，并启动空闲淘汰计时。
    pub(crate) fn request_pin(&self) -> Result<String, TransferError> {
        let mut inner = self.lock();
        if inner.pending.len() >= MAX_PENDING_PINS {
            warn!(pending = inner.pending.len(), "transfer pin table is full");
            return Err(TransferError::TooManyPending);
        }
        let pin = loop {
            let candidate = inner.ratchet_pin();
            if !inner.pending.contains_key(&candidate) {
                break candidate;
            }
        };
        let generation = inner.bump_generation();
        let timer = self.arm_timer(pin.clone(), generation);
        inner.pending.insert(
            pin.clone(),
            PendingTransfer {
                step: 1,
                slots: TransferSlots::Empty,
                timer,
                generation,
            },
        );
        debug!(pending = inner.pending.len(), "transfer pin issued");
        Ok(pin)
    }

    /// 一方到达。返回的接收端在配对成功或 pin 过期时得到结果。
    pub(crate) fn attach(
        &self,
        pin: &str,
        role: TransferRole,
        body: Body,
    ) -> Result<RelayReceiver, TransferError> {
        let (reply, receiver) = oneshot::channel();
        let side = WaitingSide { role, body, reply };

        let mut inner = self.lock();
        let generation = inner.bump_generation();
        let entry = inner
            .pending
            .get_mut(pin)
            .ok_or(TransferError::UnknownPin)?;

        let slots = match std::mem::take(&mut entry.slots).attach(side) {
            Ok(slots) => slots,
            Err((unchanged, err)) => {
                entry.slots = unchanged;
                return Err(err);
            }
        };
        let (first, second) = match slots {
            TransferSlots::BothSides(first, second) => (first, second),
            waiting => {
                entry.slots = waiting;
                return Ok(receiver);
            }
        };

        entry.timer.abort();
        entry.step += 1;
        entry.generation = generation;
        entry.timer = self.arm_timer(pin.to_string(), generation);
        let step = entry.step;
        drop(inner);

        info!(step, "transfer sides paired");
        let WaitingSide {
            body: first_body,
            reply: first_reply,
            ..
        } = first;
        let WaitingSide {
            body: second_body,
            reply: second_reply,
            ..
        } = second;
        let _ = first_reply.send(Ok(RelayLeg {
            step,
            body: second_body,
        }));
        let _ = second_reply.send(Ok(RelayLeg {
            step,
            body: first_body,
        }));
        Ok(receiver)
    }

    fn arm_timer(&self, pin: String, generation: u64) -> AbortHandle {
        let table = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(TRANSFER_IDLE_TIMEOUT).await;
            expire(&table, &pin, generation);
        })
        .abort_handle()
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    #[cfg(test)]
    fn step(&self, pin: &str) -> Option<u64> {
        self.lock().pending.get(pin).map(|entry| entry.step)
    }
}

/// 计时到期：仅当代数未变时移除，仍在等待的一侧收到过期通知。
fn expire(table: &Weak<Mutex<TransferInner>>, pin: &str, generation: u64) {
    let Some(inner) = table.upgrade() else {
        return;
    };
    let removed = {
        let mut inner = inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match inner.pending.get(pin) {
            Some(entry) if entry.generation == generation => inner.pending.remove(pin),
            _ => None,
        }
    };
    let Some(entry) = removed else {
        return;
    };
    debug!(step = entry.step, "transfer pin expired");
    if let TransferSlots::OneSide(waiting) = entry.slots {
        let _ = waiting.reply.send(Err(TransferError::Expired));
    }
}
