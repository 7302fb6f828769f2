//! Binary encode/decode for messages on stream channels.
//!
//! All integers are little-endian. Strings are length-prefixed with a `u32`
//! length. Counts read from the wire are bounded before anything is
//! allocated for them, and the encoder refuses messages the decoder would
//! reject.

use std::io::{Read, Write};

use crate::error::TransportError;
use crate::types::{DataFrame, FieldPayload, Message};
use crate::{FORMAT_VERSION, MAGIC};

/// Longest string (participant or data name) on the wire.
pub const MAX_NAME_LEN: usize = 4096;

/// Largest per-field value count on the wire.
pub const MAX_FIELD_VALUES: usize = 1 << 26;

/// Largest number of fields in one data frame.
pub const MAX_FIELDS: usize = 1 << 12;

const TAG_HELLO: u8 = 1;
const TAG_DATA: u8 = 2;
const TAG_GOODBYE: u8 = 3;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), TransportError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> Result<(), TransportError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes) of at most
/// [`MAX_NAME_LEN`] bytes.
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> Result<(), TransportError> {
    write_u32_le(w, bounded_len(s.len(), MAX_NAME_LEN, "string")?)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Write a count-prefixed run of at most [`MAX_FIELD_VALUES`] little-endian
/// f64 values.
pub fn write_f64_slice(w: &mut dyn Write, values: &[f64]) -> Result<(), TransportError> {
    write_u32_le(w, bounded_len(values.len(), MAX_FIELD_VALUES, "value array")?)?;
    for v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn bounded_len(len: usize, max: usize, what: &str) -> Result<u32, TransportError> {
    if len > max {
        return Err(TransportError::MalformedMessage {
            detail: format!("{what} length {len} exceeds {max}"),
        });
    }
    u32::try_from(len).map_err(|_| TransportError::MalformedMessage {
        detail: format!("{what} length {len} exceeds u32"),
    })
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, TransportError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian u32.
pub fn read_u32_le(r: &mut dyn Read) -> Result<u32, TransportError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a length-prefixed UTF-8 string of at most [`MAX_NAME_LEN`] bytes.
pub fn read_length_prefixed_str(r: &mut dyn Read) -> Result<String, TransportError> {
    let len = read_u32_le(r)? as usize;
    if len > MAX_NAME_LEN {
        return Err(TransportError::MalformedMessage {
            detail: format!("string length {len} exceeds {MAX_NAME_LEN}"),
        });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| TransportError::MalformedMessage {
        detail: format!("invalid UTF-8 string: {e}"),
    })
}

/// Read a count-prefixed run of little-endian f64 values.
pub fn read_f64_vec(r: &mut dyn Read) -> Result<Vec<f64>, TransportError> {
    let count = read_u32_le(r)? as usize;
    if count > MAX_FIELD_VALUES {
        return Err(TransportError::MalformedMessage {
            detail: format!("value count {count} exceeds {MAX_FIELD_VALUES}"),
        });
    }
    let want = count * 8;
    // Grow with the data actually received, not with the announced count.
    let mut bytes = Vec::new();
    (&mut *r).take(want as u64).read_to_end(&mut bytes)?;
    if bytes.len() != want {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            f64::from_le_bytes(b)
        })
        .collect())
}

// ── Preamble ────────────────────────────────────────────────────

/// Write the connection preamble (magic + format version).
pub fn encode_preamble(w: &mut dyn Write) -> Result<(), TransportError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)
}

/// Read and check the connection preamble.
pub fn decode_preamble(r: &mut dyn Read) -> Result<(), TransportError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(TransportError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(TransportError::UnsupportedVersion { found: version });
    }
    Ok(())
}

// ── Messages ────────────────────────────────────────────────────

/// Encode one message. A message exceeding the wire limits fails before
/// any byte is written.
pub fn encode_message(w: &mut dyn Write, message: &Message) -> Result<(), TransportError> {
    check_limits(message)?;
    match message {
        Message::Hello { participant } => {
            write_u8(w, TAG_HELLO)?;
            write_length_prefixed_str(w, participant)
        }
        Message::Data(frame) => {
            write_u8(w, TAG_DATA)?;
            encode_frame(w, frame)
        }
        Message::Goodbye => write_u8(w, TAG_GOODBYE),
    }
}

fn check_limits(message: &Message) -> Result<(), TransportError> {
    match message {
        Message::Hello { participant } => {
            bounded_len(participant.len(), MAX_NAME_LEN, "string")?;
        }
        Message::Data(frame) => {
            bounded_len(frame.fields.len(), MAX_FIELDS, "field list")?;
            for field in &frame.fields {
                bounded_len(field.name.len(), MAX_NAME_LEN, "string")?;
                bounded_len(field.values.len(), MAX_FIELD_VALUES, "value array")?;
            }
        }
        Message::Goodbye => {}
    }
    Ok(())
}

fn encode_frame(w: &mut dyn Write, frame: &DataFrame) -> Result<(), TransportError> {
    write_u32_le(w, frame.window)?;
    write_u32_le(w, frame.iteration)?;
    write_u8(
        w,
        match frame.converged {
            None => 0,
            Some(false) => 1,
            Some(true) => 2,
        },
    )?;
    write_u32_le(w, bounded_len(frame.fields.len(), MAX_FIELDS, "field list")?)?;
    for field in &frame.fields {
        write_length_prefixed_str(w, &field.name)?;
        write_f64_slice(w, &field.values)?;
    }
    Ok(())
}

/// Decode one message.
pub fn decode_message(r: &mut dyn Read) -> Result<Message, TransportError> {
    match read_u8(r)? {
        TAG_HELLO => Ok(Message::Hello {
            participant: read_length_prefixed_str(r)?,
        }),
        TAG_DATA => decode_frame(r).map(Message::Data),
        TAG_GOODBYE => Ok(Message::Goodbye),
        tag => Err(TransportError::UnknownMessageTag { tag }),
    }
}

fn decode_frame(r: &mut dyn Read) -> Result<DataFrame, TransportError> {
    let window = read_u32_le(r)?;
    let iteration = read_u32_le(r)?;
    let converged = match read_u8(r)? {
        0 => None,
        1 => Some(false),
        2 => Some(true),
        other => {
            return Err(TransportError::MalformedMessage {
                detail: format!("invalid convergence flag {other}"),
            })
        }
    };
    let count = read_u32_le(r)? as usize;
    if count > MAX_FIELDS {
        return Err(TransportError::MalformedMessage {
            detail: format!("field count {count} exceeds {MAX_FIELDS}"),
        });
    }
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_length_prefixed_str(r)?;
        let values = read_f64_vec(r)?;
        fields.push(FieldPayload { name, values });
    }
    Ok(DataFrame {
        window,
        iteration,
        converged,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_frame() -> DataFrame {
        DataFrame {
            window: 3,
            iteration: 2,
            converged: Some(false),
            fields: vec![
                FieldPayload {
                    name: "Forces".into(),
                    values: vec![0.5, -1.25, 3.0],
                },
                FieldPayload {
                    name: "Empty".into(),
                    values: vec![],
                },
            ],
        }
    }

    #[test]
    fn data_frame_survives_the_wire() {
        let msg = Message::Data(sample_frame());
        let mut buf = Vec::new();
        encode_message(&mut buf, &msg).unwrap();
        let decoded = decode_message(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn preamble_rejects_wrong_magic() {
        let mut bytes = b"NOPE".to_vec();
        bytes.push(FORMAT_VERSION);
        let err = decode_preamble(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, TransportError::InvalidMagic));
    }

    #[test]
    fn preamble_rejects_future_version() {
        let mut bytes = MAGIC.to_vec();
        bytes.push(FORMAT_VERSION + 1);
        let err = decode_preamble(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnsupportedVersion { found } if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let err = decode_message(&mut Cursor::new(vec![0x7f])).unwrap_err();
        assert!(matches!(err, TransportError::UnknownMessageTag { tag: 0x7f }));
    }

    #[test]
    fn oversized_value_count_is_rejected_before_allocation() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, u32::MAX).unwrap();
        let err = read_f64_vec(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage { .. }));
    }

    #[test]
    fn overlong_name_is_refused_by_the_encoder() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        let mut buf = Vec::new();
        let err = write_length_prefixed_str(&mut buf, &name).unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage { .. }));
        assert!(buf.is_empty());

        let err = encode_message(&mut buf, &Message::Hello { participant: name }).unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage { .. }));
        assert!(buf.is_empty());

        let longest = "x".repeat(MAX_NAME_LEN);
        write_length_prefixed_str(&mut buf, &longest).unwrap();
        assert_eq!(read_length_prefixed_str(&mut Cursor::new(buf)).unwrap(), longest);
    }

    #[test]
    fn oversized_frame_writes_nothing() {
        let mut frame = sample_frame();
        frame.fields[1].name = "y".repeat(MAX_NAME_LEN + 1);
        let mut buf = Vec::new();
        let err = encode_message(&mut buf, &Message::Data(frame)).unwrap_err();
        assert!(err.to_string().contains("string length"));
        assert!(buf.is_empty());

        let mut frame = sample_frame();
        frame.fields = vec![
            FieldPayload {
                name: "F".into(),
                values: vec![],
            };
            MAX_FIELDS + 1
        ];
        let err = encode_message(&mut buf, &Message::Data(frame)).unwrap_err();
        assert!(err.to_string().contains("field list"));
        assert!(buf.is_empty());
    }

    #[test]
    fn bad_convergence_flag_is_malformed() {
        let mut buf = Vec::new();
        write_u8(&mut buf, TAG_DATA).unwrap();
        write_u32_le(&mut buf, 1).unwrap();
        write_u32_le(&mut buf, 1).unwrap();
        write_u8(&mut buf, 9).unwrap();
        let err = decode_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, TransportError::MalformedMessage { .. }));
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut buf = Vec::new();
        encode_message(&mut buf, &Message::Data(sample_frame())).unwrap();
        buf.truncate(buf.len() - 3);
        let err = decode_message(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
