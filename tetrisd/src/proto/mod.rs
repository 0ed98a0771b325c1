/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Wire protocol shared by the daemon, the client shim, and `tetrisctl`.
//!
//! All records are fixed-size tagged unions: a little-endian `u32` opcode
//! followed by the payload of the largest variant, zero-padded.  Strings are
//! fixed-width UTF-8 fields, NUL-padded; decoding stops at the first NUL.
//! The fixed size is what allows the connection layer to demand exact-size
//! transfers and treat anything else as a protocol error.
//!
//! | Record | Size | Channel |
//! |---|---|---|
//! | [`TetrisData`] | 212 bytes | client socket (shim ↔ daemon) |
//! | [`ControlData`] | 114 bytes | control socket (`tetrisctl` → daemon) |

use thiserror::Error;

use crate::cpumask::CpuMask;

/// Default path of the client endpoint.
pub const SERVER_SOCKET: &str = "/tmp/tetris_socket";

/// Default path of the control endpoint.
pub const CONTROL_SOCKET: &str = "/tmp/tetris_ctl";

// Field widths (bytes) of the fixed string fields.
pub const EXEC_LEN: usize = 100;
pub const THREAD_NAME_LEN: usize = 100;
pub const CRITERIA_LEN: usize = 25;
pub const MAPPING_NAME_LEN: usize = 25;
pub const FILTER_LEN: usize = 50;

/// A record failed to encode or decode.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode {op}")]
    UnknownOpcode { op: u32 },

    #[error("field '{field}' exceeds its wire width of {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// A fixed-size wire record.
pub trait Frame: Sized {
    /// Exact encoded size in bytes.
    const LEN: usize;

    /// Encode into `buf`, which the caller provides zeroed with
    /// `buf.len() == Self::LEN`.
    fn encode(&self, buf: &mut [u8]) -> Result<(), ProtocolError>;

    /// Decode from `buf` with `buf.len() == Self::LEN`.
    fn decode(buf: &[u8]) -> Result<Self, ProtocolError>;
}

// ── Client channel ────────────────────────────────────────────────────────────

/// `NEW_CLIENT` payload: everything the shim knows about a starting process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewClient {
    pub pid: i32,
    /// Executable path or name; the daemon reduces it to a basename.
    pub exec: String,
    /// Dynamic clients get mapping-wide affinity instead of per-thread pins.
    pub dynamic_client: bool,
    pub compare_criteria: String,
    pub compare_more_is_better: bool,
    pub preferred_mapping: Option<String>,
    pub filter_criteria: Option<String>,
}

/// Records exchanged on the client channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TetrisData {
    NewClient(NewClient),
    /// `id` is the server-side client id that `tetrisctl upd_client` targets.
    NewClientAck { id: i32, managed: bool },
    NewThread { tid: i32, name: String },
    NewThreadAck { managed: bool },
}

mod opcode {
    pub const NEW_CLIENT: u32 = 1;
    pub const NEW_CLIENT_ACK: u32 = 2;
    pub const NEW_THREAD: u32 = 3;
    pub const NEW_THREAD_ACK: u32 = 4;

    pub const UPDATE_CLIENT: u32 = 1;
    pub const UPDATE_MAPPINGS: u32 = 2;
    pub const BLOCK_CPUS: u32 = 3;
}

impl Frame for TetrisData {
    // op + (pid + exec + dynamic + criteria + more_is_better
    //        + has_preferred + preferred + has_filter + filter)
    const LEN: usize = 4
        + (4 + EXEC_LEN + 1 + CRITERIA_LEN + 1 + 1 + MAPPING_NAME_LEN + 1 + FILTER_LEN);

    fn encode(&self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        let mut enc = Encoder::new(buf);
        match self {
            TetrisData::NewClient(nc) => {
                enc.u32(opcode::NEW_CLIENT);
                enc.i32(nc.pid);
                enc.str("exec", &nc.exec, EXEC_LEN)?;
                enc.bool(nc.dynamic_client);
                enc.str("compare_criteria", &nc.compare_criteria, CRITERIA_LEN)?;
                enc.bool(nc.compare_more_is_better);
                enc.opt_str(
                    "preferred_mapping",
                    nc.preferred_mapping.as_deref(),
                    MAPPING_NAME_LEN,
                )?;
                enc.opt_str("filter_criteria", nc.filter_criteria.as_deref(), FILTER_LEN)?;
            }
            TetrisData::NewClientAck { id, managed } => {
                enc.u32(opcode::NEW_CLIENT_ACK);
                enc.i32(*id);
                enc.bool(*managed);
            }
            TetrisData::NewThread { tid, name } => {
                enc.u32(opcode::NEW_THREAD);
                enc.i32(*tid);
                enc.str("name", name, THREAD_NAME_LEN)?;
            }
            TetrisData::NewThreadAck { managed } => {
                enc.u32(opcode::NEW_THREAD_ACK);
                enc.bool(*managed);
            }
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut dec = Decoder::new(buf);
        match dec.u32() {
            opcode::NEW_CLIENT => {
                let pid = dec.i32();
                let exec = dec.str("exec", EXEC_LEN)?;
                let dynamic_client = dec.bool();
                let compare_criteria = dec.str("compare_criteria", CRITERIA_LEN)?;
                let compare_more_is_better = dec.bool();
                let preferred_mapping =
                    dec.opt_str("preferred_mapping", MAPPING_NAME_LEN)?;
                let filter_criteria = dec.opt_str("filter_criteria", FILTER_LEN)?;

                Ok(TetrisData::NewClient(NewClient {
                    pid,
                    exec,
                    dynamic_client,
                    compare_criteria,
                    compare_more_is_better,
                    preferred_mapping,
                    filter_criteria,
                }))
            }
            opcode::NEW_CLIENT_ACK => Ok(TetrisData::NewClientAck {
                id: dec.i32(),
                managed: dec.bool(),
            }),
            opcode::NEW_THREAD => Ok(TetrisData::NewThread {
                tid: dec.i32(),
                name: dec.str("name", THREAD_NAME_LEN)?,
            }),
            opcode::NEW_THREAD_ACK => Ok(TetrisData::NewThreadAck {
                managed: dec.bool(),
            }),
            op => Err(ProtocolError::UnknownOpcode { op }),
        }
    }
}

// ── Control channel ───────────────────────────────────────────────────────────

/// `UPDATE_CLIENT` payload: per-field presence, absent fields stay untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateClient {
    /// Id reported in [`TetrisData::NewClientAck`].
    pub client_id: i32,
    pub dynamic_client: Option<bool>,
    /// `(criteria, more_is_better)`.
    pub comparator: Option<(String, bool)>,
    pub preferred_mapping: Option<String>,
    pub filter_criteria: Option<String>,
}

/// Records accepted on the single-shot control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlData {
    UpdateClient(UpdateClient),
    UpdateMappings,
    BlockCpus { cpus: CpuMask },
}

impl Frame for ControlData {
    // op + (client_id + has_dynamic + dynamic + has_compare + criteria
    //        + more_is_better + has_preferred + preferred + has_filter + filter)
    const LEN: usize =
        4 + (4 + 1 + 1 + 1 + CRITERIA_LEN + 1 + 1 + MAPPING_NAME_LEN + 1 + FILTER_LEN);

    fn encode(&self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        let mut enc = Encoder::new(buf);
        match self {
            ControlData::UpdateClient(uc) => {
                enc.u32(opcode::UPDATE_CLIENT);
                enc.i32(uc.client_id);
                enc.bool(uc.dynamic_client.is_some());
                enc.bool(uc.dynamic_client.unwrap_or(false));
                match &uc.comparator {
                    Some((criteria, more_is_better)) => {
                        enc.bool(true);
                        enc.str("compare_criteria", criteria, CRITERIA_LEN)?;
                        enc.bool(*more_is_better);
                    }
                    None => {
                        enc.bool(false);
                        enc.str("compare_criteria", "", CRITERIA_LEN)?;
                        enc.bool(false);
                    }
                }
                enc.opt_str(
                    "preferred_mapping",
                    uc.preferred_mapping.as_deref(),
                    MAPPING_NAME_LEN,
                )?;
                enc.opt_str("filter_criteria", uc.filter_criteria.as_deref(), FILTER_LEN)?;
            }
            ControlData::UpdateMappings => {
                enc.u32(opcode::UPDATE_MAPPINGS);
            }
            ControlData::BlockCpus { cpus } => {
                enc.u32(opcode::BLOCK_CPUS);
                enc.u64(cpus.bits());
            }
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut dec = Decoder::new(buf);
        match dec.u32() {
            opcode::UPDATE_CLIENT => {
                let client_id = dec.i32();
                let has_dynamic = dec.bool();
                let dynamic = dec.bool();
                let has_compare = dec.bool();
                let criteria = dec.str("compare_criteria", CRITERIA_LEN)?;
                let more_is_better = dec.bool();
                let preferred_mapping = dec.opt_str("preferred_mapping", MAPPING_NAME_LEN)?;
                let filter_criteria = dec.opt_str("filter_criteria", FILTER_LEN)?;

                Ok(ControlData::UpdateClient(UpdateClient {
                    client_id,
                    dynamic_client: has_dynamic.then_some(dynamic),
                    comparator: has_compare.then_some((criteria, more_is_better)),
                    preferred_mapping,
                    filter_criteria,
                }))
            }
            opcode::UPDATE_MAPPINGS => Ok(ControlData::UpdateMappings),
            opcode::BLOCK_CPUS => Ok(ControlData::BlockCpus {
                cpus: CpuMask::from_bits_truncate(dec.u64()),
            }),
            op => Err(ProtocolError::UnknownOpcode { op }),
        }
    }
}

// ── Field codec ───────────────────────────────────────────────────────────────

struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Encoder { buf, pos: 0 }
    }

    fn u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn i32(&mut self, v: i32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn u64(&mut self, v: u64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }

    fn bool(&mut self, v: bool) {
        self.buf[self.pos] = v as u8;
        self.pos += 1;
    }

    /// NUL-padded fixed-width string field.
    fn str(
        &mut self,
        field: &'static str,
        s: &str,
        width: usize,
    ) -> Result<(), ProtocolError> {
        let bytes = s.as_bytes();
        if bytes.len() > width {
            return Err(ProtocolError::FieldTooLong { field, max: width });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        // The remainder is already zeroed by the caller.
        self.pos += width;
        Ok(())
    }

    /// Presence byte followed by the (possibly empty) string field.
    fn opt_str(
        &mut self,
        field: &'static str,
        s: Option<&str>,
        width: usize,
    ) -> Result<(), ProtocolError> {
        self.bool(s.is_some());
        self.str(field, s.unwrap_or(""), width)
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn i32(&mut self) -> i32 {
        let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }

    fn bool(&mut self) -> bool {
        let v = self.buf[self.pos] != 0;
        self.pos += 1;
        v
    }

    fn str(&mut self, field: &'static str, width: usize) -> Result<String, ProtocolError> {
        let raw = &self.buf[self.pos..self.pos + width];
        self.pos += width;

        let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
        std::str::from_utf8(&raw[..end])
            .map(str::to_string)
            .map_err(|_| ProtocolError::InvalidUtf8 { field })
    }

    fn opt_str(
        &mut self,
        field: &'static str,
        width: usize,
    ) -> Result<Option<String>, ProtocolError> {
        let present = self.bool();
        let s = self.str(field, width)?;
        Ok(present.then_some(s))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
