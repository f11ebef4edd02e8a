//! Typed versions of the WebDAV request headers this engine recognizes.
use headers::Header;
use http::header::{HeaderName, HeaderValue};

pub static DEPTH: HeaderName = HeaderName::from_static("depth");
pub static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
pub static RANGE: HeaderName = HeaderName::from_static("range");

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        match value.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            v if v.eq_ignore_ascii_case(b"infinity") => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Overwrite: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let line = one(values)?;
        match line.as_bytes() {
            b"F" | b"f" => Ok(Overwrite(false)),
            b"T" | b"t" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Range: header, single range only.
///
/// Parsing is lenient: the first run of digits is the start offset,
/// and a run of digits directly after the separator that follows
/// it is the end offset. `bytes=100-` leaves the end open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl Default for ByteRange {
    fn default() -> ByteRange {
        ByteRange { start: 0, end: None }
    }
}

fn digits(s: &[u8]) -> usize {
    s.iter().take_while(|c| c.is_ascii_digit()).count()
}

fn parse_u64(s: &[u8]) -> Result<u64, headers::Error> {
    std::str::from_utf8(s)
        .map_err(map_invalid)?
        .parse::<u64>()
        .map_err(map_invalid)
}

impl Header for ByteRange {
    fn name() -> &'static HeaderName {
        &RANGE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.as_bytes();
        let i = s.iter().position(|c| c.is_ascii_digit()).ok_or_else(invalid)?;
        let j = i + digits(&s[i..]);
        let start = parse_u64(&s[i..j])?;
        let end = match s.get(j + 1..) {
            Some(rest) if digits(rest) > 0 => Some(parse_u64(&rest[..digits(rest)])?),
            _ => None,
        };
        Ok(ByteRange { start, end })
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            values.extend(std::iter::once(value));
        }
    }
}
