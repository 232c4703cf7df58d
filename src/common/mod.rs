use std::time::{SystemTime, UNIX_EPOCH};

use binrw::{BinRead, BinResult, BinWrite};

mod session_key;
pub use session_key::SessionKey;

pub(crate) fn read_bool_from<T: std::convert::From<u8> + std::cmp::PartialEq>(x: T) -> bool {
    x == T::from(1u8)
}

pub(crate) fn write_bool_as<T: std::convert::From<u8>>(x: &bool) -> T {
    if *x { T::from(1u8) } else { T::from(0u8) }
}

/// Reads a fixed-size ASCII field, dropping everything from the first NUL.
pub(crate) fn read_string(byte_stream: &[u8]) -> String {
    let end = byte_stream
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(byte_stream.len());
    String::from_utf8_lossy(&byte_stream[..end]).trim().to_string()
}

/// Reads UTF-16 code units up to (and consuming) a zero code unit.
#[binrw::parser(reader, endian)]
pub(crate) fn read_utf16z() -> BinResult<String> {
    let start = reader.stream_position()?;
    let mut units = Vec::new();
    loop {
        let unit = u16::read_options(reader, endian, ())?;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }

    String::from_utf16(&units).map_err(|err| binrw::Error::AssertFail {
        pos: start,
        message: err.to_string(),
    })
}

#[binrw::writer(writer, endian)]
pub(crate) fn write_utf16z(value: &String) -> BinResult<()> {
    for unit in value.encode_utf16() {
        unit.write_options(writer, endian, ())?;
    }
    0u16.write_options(writer, endian, ())
}

/// Reads `count` zero-terminated UTF-16 strings back to back.
#[binrw::parser(reader, endian)]
pub(crate) fn read_utf16z_list(count: u8) -> BinResult<Vec<String>> {
    let mut strings = Vec::with_capacity(count as usize);
    for _ in 0..count {
        strings.push(read_utf16z(&mut *reader, endian, ())?);
    }
    Ok(strings)
}

/// Writes the strings of a list whose count goes out as a `u8`, refusing
/// lists that don't fit.
#[binrw::writer(writer, endian)]
pub(crate) fn write_utf16z_list(values: &Vec<String>) -> BinResult<()> {
    if values.len() > u8::MAX as usize {
        return Err(binrw::Error::AssertFail {
            pos: writer.stream_position()?,
            message: format!("{} strings don't fit a u8 count", values.len()),
        });
    }
    for value in values {
        write_utf16z(value, &mut *writer, endian, ())?;
    }
    Ok(())
}

/// Get the number of milliseconds since UNIX epoch.
pub fn timestamp_msecs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::Endian;

    use super::*;

    const DATA: [u8; 2] = [0u8, 1u8];

    #[test]
    fn read_bool_u8() {
        assert!(!read_bool_from::<u8>(DATA[0]));
        assert!(read_bool_from::<u8>(DATA[1]));
    }

    #[test]
    fn write_bool_u8() {
        assert_eq!(write_bool_as::<u8>(&false), DATA[0]);
        assert_eq!(write_bool_as::<u8>(&true), DATA[1]);
    }

    #[test]
    fn read_fixed_string() {
        // "FOO\0\0\0"
        let data = [0x46u8, 0x4Fu8, 0x4Fu8, 0x0u8, 0x0u8, 0x0u8];
        assert_eq!(crate::common::read_string(&data), "FOO".to_string());
        assert_eq!(crate::common::read_string(&[]), String::new());
    }

    // "FO" as UTF-16LE plus the terminator
    const WIDE_DATA: [u8; 6] = [0x46, 0x00, 0x4F, 0x00, 0x00, 0x00];

    #[test]
    fn read_wide_string() {
        let mut cursor = Cursor::new(WIDE_DATA.to_vec());
        let value = read_utf16z(&mut cursor, Endian::Little, ()).unwrap();
        assert_eq!(value, "FO");
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn write_wide_string() {
        let mut cursor = Cursor::new(Vec::new());
        write_utf16z(&"FO".to_string(), &mut cursor, Endian::Little, ()).unwrap();
        assert_eq!(cursor.into_inner(), WIDE_DATA.to_vec());
    }

    #[test]
    fn empty_wide_string_is_just_the_terminator() {
        let mut cursor = Cursor::new(Vec::new());
        write_utf16z(&String::new(), &mut cursor, Endian::Little, ()).unwrap();
        assert_eq!(cursor.into_inner(), vec![0, 0]);
    }

    #[test]
    fn unterminated_wide_string_fails() {
        let mut cursor = Cursor::new(vec![0x46, 0x00, 0x4F]);
        assert!(read_utf16z(&mut cursor, Endian::Little, ()).is_err());
    }

    #[test]
    fn wide_string_list() {
        let values = vec!["alice".to_string(), String::new(), "bob".to_string()];
        let mut cursor = Cursor::new(Vec::new());
        write_utf16z_list(&values, &mut cursor, Endian::Little, ()).unwrap();

        let mut cursor = Cursor::new(cursor.into_inner());
        let read = read_utf16z_list(&mut cursor, Endian::Little, (3,)).unwrap();
        assert_eq!(read, values);
    }
}
