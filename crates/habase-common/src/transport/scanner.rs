use crate::protocol::error::{HabaseError, Result};

/// Finds where the first MessagePack value in a growing buffer ends,
/// without decoding it.
///
/// The scanner remembers how far it got, so feeding it the same buffer
/// after more bytes arrive only walks the new bytes. A value header whose
/// payload would push the message past `limit` is rejected as soon as the
/// header is seen.
#[derive(Debug, Clone)]
pub struct MessageScanner {
    limit: usize,
    /// Offset of the next value header to read
    pos: usize,
    /// Items still owed by each open array or map, innermost last
    pending: Vec<u64>,
}

/// Header of one value: its own size, payload bytes and child items.
struct Header {
    len: usize,
    payload: usize,
    children: u64,
}

impl MessageScanner {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            pos: 0,
            pending: Vec::new(),
        }
    }

    /// Returns the length of the first complete message in `data`, or
    /// `None` if more bytes are needed.
    ///
    /// `data` must start at the same message across calls. Once a length is
    /// returned the scanner resets for the next message.
    pub fn scan(&mut self, data: &[u8]) -> Result<Option<usize>> {
        loop {
            let Some(header) = read_header(&data[self.pos..])? else {
                return Ok(None);
            };

            let end = self.pos.saturating_add(header.len).saturating_add(header.payload);
            if end > self.limit {
                return Err(HabaseError::Transport(format!(
                    "Message too large: at least {} bytes (max {} bytes)",
                    end, self.limit
                )));
            }
            if end > data.len() {
                return Ok(None);
            }
            self.pos = end;

            if header.children > 0 {
                self.pending.push(header.children);
                continue;
            }

            if self.finish_value() {
                let len = self.pos;
                self.pos = 0;
                return Ok(Some(len));
            }
        }
    }

    /// Counts one finished value against the open containers. Returns `true`
    /// when that completes the top-level message.
    fn finish_value(&mut self) -> bool {
        while let Some(remaining) = self.pending.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                return false;
            }
            self.pending.pop();
        }
        true
    }
}

fn read_header(data: &[u8]) -> Result<Option<Header>> {
    let Some(&marker) = data.first() else {
        return Ok(None);
    };

    let fixed = |len: usize| Some(Header { len, payload: 0, children: 0 });

    let header = match marker {
        0x00..=0x7f | 0xe0..=0xff | 0xc0 | 0xc2 | 0xc3 => fixed(1),
        0x80..=0x8f => Some(Header {
            len: 1,
            payload: 0,
            children: 2 * u64::from(marker & 0x0f),
        }),
        0x90..=0x9f => Some(Header {
            len: 1,
            payload: 0,
            children: u64::from(marker & 0x0f),
        }),
        0xa0..=0xbf => Some(Header {
            len: 1,
            payload: usize::from(marker & 0x1f),
            children: 0,
        }),
        0xcc | 0xd0 => fixed(2),
        0xcd | 0xd1 => fixed(3),
        0xca | 0xce | 0xd2 => fixed(5),
        0xcb | 0xcf | 0xd3 => fixed(9),
        // fixext: marker, type, data
        0xd4 => fixed(3),
        0xd5 => fixed(4),
        0xd6 => fixed(6),
        0xd7 => fixed(10),
        0xd8 => fixed(18),
        // str / bin: marker, length, data
        0xc4 | 0xd9 => sized(data, 1, 0),
        0xc5 | 0xda => sized(data, 2, 0),
        0xc6 | 0xdb => sized(data, 4, 0),
        // ext: marker, length, type, data
        0xc7 => sized(data, 1, 1),
        0xc8 => sized(data, 2, 1),
        0xc9 => sized(data, 4, 1),
        0xdc => counted(data, 2, 1),
        0xdd => counted(data, 4, 1),
        0xde => counted(data, 2, 2),
        0xdf => counted(data, 4, 2),
        0xc1 => {
            return Err(HabaseError::Transport(
                "Invalid MessagePack marker 0xc1".to_string(),
            ))
        }
    };

    Ok(header)
}

/// Big-endian length of `width` bytes following the marker.
fn length(data: &[u8], width: usize) -> Option<u64> {
    let bytes = data.get(1..1 + width)?;
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn sized(data: &[u8], width: usize, extra: usize) -> Option<Header> {
    let payload = length(data, width)?;
    Some(Header {
        len: 1 + width + extra,
        payload: usize::try_from(payload).unwrap_or(usize::MAX),
        children: 0,
    })
}

fn counted(data: &[u8], width: usize, per_entry: u64) -> Option<Header> {
    let count = length(data, width)?;
    Some(Header {
        len: 1 + width,
        payload: 0,
        children: count * per_entry,
    })
}
