//! Host-wide instance slots.
//!
//! Each running testnet claims one slot by listening on a loopback port in
//! `FIRST_PORT..=LAST_PORT`. The listener lives as long as the [`InstanceSlot`] guard, so
//! the slot is released when the guard is dropped or the process exits.
use std::net::{Ipv4Addr, TcpListener};

use anyhow::Result;
use tracing::debug;

use crate::error::TestnetError;

pub const FIRST_PORT: u16 = 6666;
pub const SLOTS: u16 = 300;
pub const LAST_PORT: u16 = FIRST_PORT + SLOTS - 1;

/// Distance between the port ranges of two neighbouring slots. A slot has room for this
/// many networks.
pub const SLOT_WIDTH: u32 = 100;

// The highest published port of the last slot must still be a port.
const _: () = assert!(
    (SLOTS as u32 - 1) * SLOT_WIDTH + SLOT_WIDTH + crate::compose::RPC_PORT <= u16::MAX as u32
);

#[derive(Debug)]
pub struct InstanceSlot {
    index: u16,
    _listener: TcpListener,
}

impl InstanceSlot {
    /// Claim the lowest free slot.
    pub fn acquire() -> Result<Self> {
        Self::acquire_from(0)
    }

    /// Claim the lowest free slot at or above `start`.
    pub fn acquire_from(start: u16) -> Result<Self> {
        for index in start..SLOTS {
            let port = FIRST_PORT + index;
            match TcpListener::bind((Ipv4Addr::LOCALHOST, port)) {
                Ok(listener) => {
                    debug!(slot = index, port, "acquired instance slot");
                    return Ok(Self {
                        index,
                        _listener: listener,
                    });
                }
                Err(err) => debug!(slot = index, port, %err, "instance slot is taken"),
            }
        }
        Err(TestnetError::NoFreeSlot {
            first: FIRST_PORT,
            last: LAST_PORT,
        }
        .into())
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn port_offset(&self) -> u32 {
        u32::from(self.index) * SLOT_WIDTH
    }
}
