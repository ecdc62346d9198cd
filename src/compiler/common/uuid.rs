use std::{fmt, str::FromStr};

use anyhow::{bail, Result};

/// RFC 4122 identifier in its canonical hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid([u8; 16]);
impl Uuid {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}
impl FromStr for Uuid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // 8-4-4-4-12 hex digit groups.
        let groups = s.split('-').collect::<Vec<_>>();
        let lens = groups.iter().map(|x| x.len()).collect::<Vec<_>>();
        if lens != [8, 4, 4, 4, 12] {
            bail!("malformed uuid `{}`", s);
        }
        let digits = groups.concat();
        if !digits.bytes().all(|x| x.is_ascii_hexdigit()) {
            bail!("malformed uuid `{}`", s);
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)?;
        }
        Ok(Self(bytes))
    }
}
impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
