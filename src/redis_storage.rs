use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use redis::{Client, Commands, Connection};
use tracing::debug;

use crate::config::{CounterWidth, FilterConfig, FilterParams};
use crate::counting::CountingBloomFilter;
use crate::error::{FilterError, Result};
use crate::expiring::ExpiringBloomFilter;
use crate::filter::BloomFilter;
use crate::storage::{BitVector, ReadConsistency, byte_len};

/// Bit vector whose storage lives in a shared Redis instance.
///
/// The struct is only a handle: key name, dimensions and connections. The
/// bytes belong to the store, so concurrent processes holding equally
/// configured handles observe each other's writes once committed.
///
/// Single-slot operations cost one round trip. Bulk operations are issued
/// as one pipelined request covering `width * positions` GETBIT/SETBIT
/// commands, so probing or setting all k positions of an element stays a
/// single round trip. Writes are wrapped in MULTI/EXEC, which makes each
/// bulk write atomic as a set; a bulk read followed by a bulk write is
/// deliberately not atomic across the pair.
pub struct RedisBitVector {
    conn: Mutex<Connection>,
    replica: Option<Mutex<Connection>>,
    key: String,
    slots: usize,
    width: u8,
}

impl RedisBitVector {
    /// Connects to `url` and binds the vector to `key`. A missing key
    /// reads as an all-zero vector.
    pub fn open(
        url: &str,
        key: impl Into<String>,
        slots: usize,
        width: u8,
    ) -> Result<Self> {
        Self::open_with_replica(url, None, key, slots, width)
    }

    /// Like [`open`], with an optional read replica that serves
    /// [`ReadConsistency::StaleOk`] bulk reads. Writes always target the
    /// primary.
    ///
    /// [`open`]: RedisBitVector::open
    pub fn open_with_replica(
        url: &str,
        replica_url: Option<&str>,
        key: impl Into<String>,
        slots: usize,
        width: u8,
    ) -> Result<Self> {
        if slots == 0 {
            return Err(FilterError::InvalidConfig(
                "Bit vector must have at least one slot".into(),
            ));
        }
        if !matches!(width, 1 | 4 | 8 | 16 | 32 | 64) {
            return Err(FilterError::InvalidConfig(format!(
                "Unsupported slot width: {width}"
            )));
        }
        let conn = connect(url)?;
        let replica = match replica_url {
            Some(replica_url) => Some(Mutex::new(connect(replica_url)?)),
            None => None,
        };
        Ok(Self {
            conn: Mutex::new(conn),
            replica,
            key: key.into(),
            slots,
            width,
        })
    }

    fn primary(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    fn read_conn(
        &self,
        consistency: ReadConsistency,
    ) -> Result<MutexGuard<'_, Connection>> {
        match (&self.replica, consistency) {
            (Some(replica), ReadConsistency::StaleOk) => lock(replica),
            _ => lock(&self.conn),
        }
    }

    fn check_positions(&self, positions: &[usize]) -> Result<()> {
        if let Some(&max_index) = positions.iter().max() {
            if max_index >= self.slots {
                return Err(FilterError::IndexOutOfBounds {
                    index: max_index,
                    capacity: self.slots,
                });
            }
        }
        Ok(())
    }

    fn fetch_slots(
        &self,
        positions: &[usize],
        consistency: ReadConsistency,
    ) -> Result<Vec<u64>> {
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        self.check_positions(positions)?;

        let width = self.width as usize;
        let mut pipe = redis::pipe();
        for &position in positions {
            for j in 0..width {
                pipe.cmd("GETBIT")
                    .arg(&self.key)
                    .arg(position * width + j);
            }
        }
        let mut conn = self.read_conn(consistency)?;
        let bits: Vec<i64> = pipe.query(&mut *conn)?;
        Ok(assemble_slots(&bits, width))
    }
}

fn connect(url: &str) -> Result<Connection> {
    let client = Client::open(url)?;
    Ok(client.get_connection()?)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        FilterError::StorageError(format!("Connection lock poisoned: {e}"))
    })
}

/// Folds a flat GETBIT/SETBIT reply stream back into slot values, `width`
/// consecutive bits each, most significant bit first.
fn assemble_slots(bits: &[i64], width: usize) -> Vec<u64> {
    bits.chunks(width)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u64, |acc, &bit| (acc << 1) | (bit as u64 & 1))
        })
        .collect()
}

impl BitVector for RedisBitVector {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn slot_width(&self) -> u8 {
        self.width
    }

    fn get(&self, position: usize) -> Result<u64> {
        let values = self.fetch_slots(&[position], ReadConsistency::Strong)?;
        Ok(values[0])
    }

    fn set(&mut self, position: usize, value: u64) -> Result<u64> {
        let previous = self.set_many(&[position], &[value])?;
        Ok(previous[0])
    }

    fn get_many(
        &self,
        positions: &[usize],
        consistency: ReadConsistency,
    ) -> Result<Vec<u64>> {
        self.fetch_slots(positions, consistency)
    }

    fn set_many(
        &mut self,
        positions: &[usize],
        values: &[u64],
    ) -> Result<Vec<u64>> {
        if positions.len() != values.len() {
            return Err(FilterError::LengthMismatch {
                positions: positions.len(),
                values: values.len(),
            });
        }
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        self.check_positions(positions)?;
        let max = self.max_value();
        for &value in values {
            if value > max {
                return Err(FilterError::ValueTooWide {
                    value,
                    width: self.width,
                });
            }
        }

        let width = self.width as usize;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (&position, &value) in positions.iter().zip(values) {
            for j in 0..width {
                let bit = (value >> (width - 1 - j)) & 1;
                pipe.cmd("SETBIT")
                    .arg(&self.key)
                    .arg(position * width + j)
                    .arg(bit);
            }
        }
        let mut conn = self.primary()?;
        let previous_bits: Vec<i64> = pipe.query(&mut *conn)?;
        Ok(assemble_slots(&previous_bits, width))
    }

    fn clear(&mut self) -> Result<()> {
        let mut conn = self.primary()?;
        let _: () = conn.del(&self.key)?;
        Ok(())
    }

    fn cardinality(&self) -> Result<u64> {
        if self.width == 1 {
            let mut conn = self.primary()?;
            let ones: u64 =
                redis::cmd("BITCOUNT").arg(&self.key).query(&mut *conn)?;
            Ok(ones)
        } else {
            // No native population count over multi-bit slots; fall back
            // to one full-vector fetch and a local scan.
            let bytes = self.to_bytes()?;
            let width = self.width as usize;
            let read_bit = |bit: usize| -> bool {
                bytes
                    .get(bit / 8)
                    .map(|&b| (b >> (7 - (bit % 8))) & 1 != 0)
                    .unwrap_or(false)
            };
            Ok((0..self.slots)
                .filter(|&slot| (0..width).any(|j| read_bit(slot * width + j)))
                .count() as u64)
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut conn = self.primary()?;
        let bytes: Option<Vec<u8>> = conn.get(&self.key)?;
        let mut bytes = bytes.unwrap_or_default();
        bytes.resize(byte_len(self.slots, self.width), 0);
        Ok(bytes)
    }

    fn overwrite_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = byte_len(self.slots, self.width);
        if bytes.len() > expected {
            return Err(FilterError::SerializationError(format!(
                "Snapshot of {} bytes does not fit a vector of {expected} bytes",
                bytes.len()
            )));
        }
        let mut padded = bytes.to_vec();
        padded.resize(expected, 0);
        let used_bits = self.slots * self.width as usize;
        let tail = used_bits % 8;
        if tail != 0 {
            if let Some(last) = padded.last_mut() {
                *last &= 0xffu8 << (8 - tail);
            }
        }
        let mut conn = self.primary()?;
        let _: () = conn.set(&self.key, padded)?;
        Ok(())
    }
}

fn bits_key(name: &str) -> String {
    format!("{name}:bits")
}

fn counts_key(name: &str) -> String {
    format!("{name}:counts")
}

fn config_key(name: &str) -> String {
    format!("{name}:config")
}

const M_FIELD: &str = "m";
const K_FIELD: &str = "k";
const N_FIELD: &str = "n";
const P_FIELD: &str = "p";
const C_FIELD: &str = "c";
const HASH_METHOD_FIELD: &str = "hashmethod";

fn persist_params(
    conn: &mut Connection,
    name: &str,
    params: &FilterParams,
) -> Result<()> {
    let fields: [(&str, String); 6] = [
        (M_FIELD, params.size.to_string()),
        (K_FIELD, params.hashes.to_string()),
        (N_FIELD, params.expected_elements.to_string()),
        (P_FIELD, params.false_positive_rate.to_string()),
        (C_FIELD, params.counter_width.bits().to_string()),
        (HASH_METHOD_FIELD, params.hash_method.to_string()),
    ];
    let _: () = conn.hset_multiple(config_key(name), &fields)?;
    Ok(())
}

fn load_params(
    conn: &mut Connection,
    name: &str,
) -> Result<Option<FilterParams>> {
    let stored: HashMap<String, String> = conn.hgetall(config_key(name))?;
    if stored.is_empty() {
        return Ok(None);
    }

    let field = |key: &str| -> Result<&String> {
        stored.get(key).ok_or_else(|| {
            FilterError::StorageError(format!(
                "Stored filter config is missing field {key}"
            ))
        })
    };
    let parse = |key: &str| -> Result<usize> {
        field(key)?.parse().map_err(|e| {
            FilterError::StorageError(format!(
                "Stored filter config field {key} is invalid: {e}"
            ))
        })
    };

    let counter_bits: u8 = parse(C_FIELD)? as u8;
    let counter_width =
        CounterWidth::from_bits(counter_bits).ok_or_else(|| {
            FilterError::StorageError(format!(
                "Stored filter config holds unsupported counter width \
                 {counter_bits}"
            ))
        })?;
    let false_positive_rate: f64 = field(P_FIELD)?.parse().map_err(|e| {
        FilterError::StorageError(format!(
            "Stored filter config field p is invalid: {e}"
        ))
    })?;

    Ok(Some(FilterParams {
        size: parse(M_FIELD)?,
        hashes: parse(K_FIELD)?,
        expected_elements: parse(N_FIELD)?,
        false_positive_rate,
        counter_width,
        hash_method: field(HASH_METHOD_FIELD)?.parse()?,
    }))
}

/// Resolves the effective parameters for a named remote filter.
///
/// Attaching to an existing name adopts the parameters persisted alongside
/// the bits, after checking that any explicitly requested size/hash-count
/// agrees with them. A fresh name (or `overwrite_if_exists`) finalizes the
/// supplied configuration, persists it and wipes stale data.
fn resolve_params(
    conn: &mut Connection,
    config: &FilterConfig,
) -> Result<FilterParams> {
    let name = config.name.as_str();
    if name.is_empty() {
        return Err(FilterError::InvalidConfig(
            "Remote-backed filters require a non-empty name".into(),
        ));
    }

    if !config.overwrite_if_exists {
        if let Some(stored) = load_params(conn, name)? {
            if let Some(size) = config.size {
                if size != stored.size {
                    return Err(FilterError::IncompatibleConfig {
                        reason: format!(
                            "requested size {size} but filter {name} is \
                             stored with size {}",
                            stored.size
                        ),
                    });
                }
            }
            if let Some(hashes) = config.hashes {
                if hashes != stored.hashes {
                    return Err(FilterError::IncompatibleConfig {
                        reason: format!(
                            "requested {hashes} hashes but filter {name} is \
                             stored with {}",
                            stored.hashes
                        ),
                    });
                }
            }
            debug!(name, "attached to existing remote filter");
            return Ok(stored);
        }
    }

    let params = FilterParams::try_from(config)?;
    let keys = vec![config_key(name), bits_key(name), counts_key(name)];
    let _: () = conn.del(keys)?;
    persist_params(conn, name, &params)?;
    debug!(name, size = params.size, hashes = params.hashes,
        "created remote filter");
    Ok(params)
}

fn open_vector(
    url: &str,
    replica_url: Option<&str>,
    config: &FilterConfig,
    counting: bool,
) -> Result<(FilterParams, RedisBitVector)> {
    let mut conn = connect(url)?;
    let params = resolve_params(&mut conn, config)?;
    let (key, width) = if counting {
        (counts_key(&config.name), params.counter_width.bits())
    } else {
        (bits_key(&config.name), 1)
    };
    let replica = match replica_url {
        Some(replica_url) => Some(Mutex::new(connect(replica_url)?)),
        None => None,
    };
    let vector = RedisBitVector {
        conn: Mutex::new(conn),
        replica,
        key,
        slots: params.size,
        width,
    };
    Ok((params, vector))
}

impl BloomFilter<RedisBitVector> {
    /// Opens (or attaches to) a named plain filter in a shared Redis
    /// instance.
    pub fn open(url: &str, config: &FilterConfig) -> Result<Self> {
        Self::open_with_replica(url, None, config)
    }

    pub fn open_with_replica(
        url: &str,
        replica_url: Option<&str>,
        config: &FilterConfig,
    ) -> Result<Self> {
        let (mut params, vector) =
            open_vector(url, replica_url, config, false)?;
        params.counter_width = CounterWidth::Plain;
        Self::with_vector(params, vector)
    }
}

impl CountingBloomFilter<RedisBitVector> {
    /// Opens (or attaches to) a named counting filter in a shared Redis
    /// instance.
    pub fn open(url: &str, config: &FilterConfig) -> Result<Self> {
        Self::open_with_replica(url, None, config)
    }

    pub fn open_with_replica(
        url: &str,
        replica_url: Option<&str>,
        config: &FilterConfig,
    ) -> Result<Self> {
        let (params, vector) = open_vector(url, replica_url, config, true)?;
        Self::with_vector(params, vector)
    }
}

impl ExpiringBloomFilter<RedisBitVector> {
    /// Opens a named expiring filter whose counting layer lives in a
    /// shared Redis instance. The expiry ledger stays in-process.
    pub fn open(url: &str, config: &FilterConfig) -> Result<Self> {
        let filter = CountingBloomFilter::open(url, config)?;
        Ok(Self::with_filter(filter, config.sweep_interval))
    }
}
