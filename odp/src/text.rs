// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Scanning and printing helpers shared by the key and action text forms.

use net::eth::mac::Mac;
use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Characters allowed between top level items.
pub(crate) const DELIMITERS: &[char] = &[',', ' ', '\t', '\r', '\n'];

/// What the scanner wanted when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Expected(pub(crate) &'static str);

/// A cursor over text.  Cheap to copy, which is how callers backtrack.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scanner<'a> {
    rest: &'a str,
}

fn is_hex(c: char) -> bool {
    c.is_ascii_hexdigit()
}

fn parse_uint(token: &str) -> Option<u64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(is_hex) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()
    } else {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        token.parse().ok()
    }
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(s: &'a str) -> Scanner<'a> {
        Scanner { rest: s }
    }

    /// The text not consumed yet.
    pub(crate) fn rest(&self) -> &'a str {
        self.rest
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    /// Consume `prefix` if the text starts with it.
    pub(crate) fn eat(&mut self, prefix: &str) -> bool {
        match self.rest.strip_prefix(prefix) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    pub(crate) fn expect(&mut self, prefix: &'static str) -> Result<(), Expected> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(Expected(prefix))
        }
    }

    pub(crate) fn skip_delimiters(&mut self) {
        self.rest = self.rest.trim_start_matches(DELIMITERS);
    }

    pub(crate) fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let end = self.rest.find(|c| !f(c)).unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        token
    }

    /// An unsigned integer, decimal or `0x` hexadecimal, that fits `T`.
    pub(crate) fn uint<T: TryFrom<u64>>(&mut self) -> Result<T, Expected> {
        let mut probe = *self;
        let token = probe.take_while(|c| c.is_ascii_alphanumeric());
        let value = parse_uint(token)
            .and_then(|v| T::try_from(v).ok())
            .ok_or(Expected("an unsigned integer"))?;
        *self = probe;
        Ok(value)
    }

    pub(crate) fn ipv4(&mut self) -> Result<Ipv4Addr, Expected> {
        let mut probe = *self;
        let addr = probe
            .take_while(|c| c.is_ascii_digit() || c == '.')
            .parse()
            .map_err(|_| Expected("an IPv4 address"))?;
        *self = probe;
        Ok(addr)
    }

    pub(crate) fn ipv6(&mut self) -> Result<Ipv6Addr, Expected> {
        let mut probe = *self;
        let addr = probe
            .take_while(|c| is_hex(c) || c == ':' || c == '.')
            .parse()
            .map_err(|_| Expected("an IPv6 address"))?;
        *self = probe;
        Ok(addr)
    }

    pub(crate) fn mac(&mut self) -> Result<Mac, Expected> {
        let mut probe = *self;
        let mac = probe
            .take_while(|c| is_hex(c) || c == ':')
            .parse()
            .map_err(|_| Expected("an Ethernet address"))?;
        *self = probe;
        Ok(mac)
    }

    /// An even number of hex digits.
    pub(crate) fn hex_bytes(&mut self) -> Result<Vec<u8>, Expected> {
        let mut probe = *self;
        let token = probe.take_while(is_hex);
        if token.len() % 2 != 0 {
            return Err(Expected("an even number of hex digits"));
        }
        let bytes = (0..token.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&token[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| Expected("hex digits"))?;
        *self = probe;
        Ok(bytes)
    }

    /// `value[/mask]`; a missing mask is `full`.
    pub(crate) fn masked<T>(
        &mut self,
        full: T,
        mut scan: impl FnMut(&mut Self) -> Result<T, Expected>,
    ) -> Result<(T, T), Expected> {
        let value = scan(self)?;
        let mask = if self.eat("/") { scan(self)? } else { full };
        Ok((value, mask))
    }
}

/// Lowest set bits first.
fn bits(mut flags: u32) -> impl Iterator<Item = u32> {
    std::iter::from_fn(move || {
        if flags == 0 {
            return None;
        }
        let bit = flags & flags.wrapping_neg();
        flags &= !bit;
        Some(bit)
    })
}

fn bit_by_name(name_of: &impl Fn(u32) -> Option<&'static str>, name: &str) -> Option<u32> {
    (0..u32::BITS)
        .map(|shift| 1u32 << shift)
        .find(|&bit| name_of(bit) == Some(name))
}

/// Names of the bits of `flags` joined by `delim`; unnamed bits print in hex and no bits print
/// as `0`.
pub(crate) fn format_flags(
    out: &mut String,
    name_of: impl Fn(u32) -> Option<&'static str>,
    flags: u32,
    delim: char,
) {
    if flags == 0 {
        out.push('0');
        return;
    }
    for (i, bit) in bits(flags).enumerate() {
        if i > 0 {
            out.push(delim);
        }
        match name_of(bit) {
            Some(name) => out.push_str(name),
            None => {
                let _ = write!(out, "{bit:#x}");
            }
        }
    }
}

/// `+name` for every bit set in both, `-name` for every bit set only in `mask`.
pub(crate) fn format_flags_masked(
    out: &mut String,
    name_of: impl Fn(u32) -> Option<&'static str>,
    flags: u32,
    mask: u32,
) {
    for bit in bits(mask) {
        out.push(if flags & bit == 0 { '-' } else { '+' });
        match name_of(bit) {
            Some(name) => out.push_str(name),
            None => {
                let _ = write!(out, "{bit:#x}");
            }
        }
    }
}

/// Flags up to (not including) the closing parenthesis.
///
/// Accepts a list of names and numbers (`syn,ack`), and when `masked` also `value/mask` and
/// `+name-name`.  Returns the flags and the mask, which is all ones for the plain list.
pub(crate) fn parse_flags(
    sc: &mut Scanner<'_>,
    name_of: impl Fn(u32) -> Option<&'static str>,
    allowed: u32,
    masked: bool,
) -> Result<(u32, u32), Expected> {
    const NOT_ALLOWED: Expected = Expected("a known flag");

    if masked {
        let mut probe = *sc;
        if let Ok(flags) = probe.uint::<u32>() {
            if probe.eat("/") {
                let mask = probe.uint::<u32>()?;
                if (flags | mask) & !allowed != 0 {
                    return Err(NOT_ALLOWED);
                }
                *sc = probe;
                return Ok((flags, mask));
            }
        }
        if matches!(sc.peek(), Some('+' | '-')) {
            let (mut flags, mut mask) = (0, 0);
            while let Some(sign @ ('+' | '-')) = sc.peek() {
                sc.eat(if sign == '+' { "+" } else { "-" });
                let name = sc.take_while(|c| !matches!(c, '+' | '-' | ')'));
                let bit = bit_by_name(&name_of, name).ok_or(NOT_ALLOWED)?;
                if mask & bit != 0 || bit & allowed == 0 {
                    return Err(NOT_ALLOWED);
                }
                if sign == '+' {
                    flags |= bit;
                }
                mask |= bit;
            }
            return Ok((flags, mask));
        }
    }

    let mut flags = 0;
    while sc.peek() != Some(')') {
        if sc.is_empty() {
            return Err(Expected(")"));
        }
        let token = sc.take_while(|c| c != ',' && c != ')');
        let bits = parse_uint(token)
            .and_then(|v| u32::try_from(v).ok())
            .or_else(|| bit_by_name(&name_of, token))
            .ok_or(NOT_ALLOWED)?;
        if bits & !allowed != 0 {
            return Err(NOT_ALLOWED);
        }
        flags |= bits;
        sc.eat(",");
    }
    Ok((flags, u32::MAX))
}

/// Contiguous lower case hex.
pub(crate) fn push_hex(out: &mut String, bytes: &[u8]) {
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
}

/// Hex bytes separated by spaces.
pub(crate) fn push_hex_spaced(out: &mut String, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
}

/// Drop one trailing `c`, if present.
pub(crate) fn chomp(out: &mut String, c: char) {
    if out.ends_with(c) {
        out.pop();
    }
}

/// A short excerpt of `rest` for error messages.
pub(crate) fn excerpt(rest: &str) -> String {
    rest.chars().take(32).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::flow::{TcpFlags, TnlFlags};
    use pretty_assertions::assert_eq;

    fn tcp_name(bit: u32) -> Option<&'static str> {
        TcpFlags::bit_name(bit)
    }

    fn tcp_allowed() -> u32 {
        u32::from(TcpFlags::MASK)
    }

    #[test]
    fn numbers() {
        let mut sc = Scanner::new("42,0x1f/0xff)");
        assert_eq!(sc.uint::<u32>(), Ok(42));
        assert!(sc.eat(","));
        assert_eq!(sc.masked(0, Scanner::uint::<u8>), Ok((0x1f, 0xff)));
        assert_eq!(sc.rest(), ")");

        let mut sc = Scanner::new("256");
        assert!(sc.uint::<u8>().is_err());
        assert_eq!(sc.rest(), "256");
        assert!(Scanner::new("0x").uint::<u8>().is_err());
        assert!(Scanner::new("x1").uint::<u8>().is_err());
    }

    #[test]
    fn addresses() {
        let mut sc = Scanner::new("10.0.0.1/255.0.0.0,");
        assert_eq!(
            sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4),
            Ok((Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 0, 0, 0)))
        );
        let mut sc = Scanner::new("fe80::1)");
        assert_eq!(sc.ipv6(), Ok("fe80::1".parse().unwrap()));
        let mut sc = Scanner::new("00:11:22:33:44:55,");
        assert_eq!(sc.mac(), Ok(Mac([0, 0x11, 0x22, 0x33, 0x44, 0x55])));
        assert_eq!(sc.rest(), ",");
        let mut sc = Scanner::new("deadbeef)");
        assert_eq!(sc.hex_bytes(), Ok(vec![0xde, 0xad, 0xbe, 0xef]));
        assert!(Scanner::new("abc").hex_bytes().is_err());
    }

    #[test]
    fn flags_format() {
        let mut out = String::new();
        format_flags(&mut out, tcp_name, 0, ',');
        assert_eq!(out, "0");
        out.clear();
        format_flags(&mut out, tcp_name, 0x012, '|');
        assert_eq!(out, "syn|ack");
        out.clear();
        format_flags(&mut out, tcp_name, 0x401, ',');
        assert_eq!(out, "fin,0x400");
        out.clear();
        format_flags_masked(&mut out, tcp_name, 0x002, 0x012);
        assert_eq!(out, "+syn-ack");
    }

    #[test]
    fn flags_parse_list() {
        let mut sc = Scanner::new("syn,ack)");
        assert_eq!(parse_flags(&mut sc, tcp_name, tcp_allowed(), false), Ok((0x12, u32::MAX)));
        assert_eq!(sc.rest(), ")");

        let mut sc = Scanner::new("fin,0x100)");
        assert_eq!(parse_flags(&mut sc, tcp_name, tcp_allowed(), true), Ok((0x101, u32::MAX)));

        let mut sc = Scanner::new("0)");
        assert_eq!(parse_flags(&mut sc, tcp_name, tcp_allowed(), false), Ok((0, u32::MAX)));

        let mut sc = Scanner::new("bogus)");
        assert!(parse_flags(&mut sc, tcp_name, tcp_allowed(), false).is_err());
        let mut sc = Scanner::new("syn");
        assert!(parse_flags(&mut sc, tcp_name, tcp_allowed(), false).is_err());
    }

    #[test]
    fn flags_parse_masked() {
        let mut sc = Scanner::new("+syn-ack)");
        assert_eq!(parse_flags(&mut sc, tcp_name, tcp_allowed(), true), Ok((0x02, 0x12)));
        assert_eq!(sc.rest(), ")");

        let mut sc = Scanner::new("0x2/0x12)");
        assert_eq!(parse_flags(&mut sc, tcp_name, tcp_allowed(), true), Ok((0x02, 0x12)));

        // repeated flag
        let mut sc = Scanner::new("+syn-syn)");
        assert!(parse_flags(&mut sc, tcp_name, tcp_allowed(), true).is_err());

        // outside the allowed set
        let allowed = u32::from(TnlFlags::all().bits());
        let mut sc = Scanner::new("0x10/0x10)");
        assert!(parse_flags(&mut sc, TnlFlags::bit_name, allowed, true).is_err());
        let mut sc = Scanner::new("df,csum)");
        assert_eq!(
            parse_flags(&mut sc, TnlFlags::bit_name, allowed, true),
            Ok((0x3, u32::MAX))
        );
    }

    #[test]
    fn hex_and_chomp() {
        let mut out = String::new();
        push_hex(&mut out, &[1, 0xab]);
        assert_eq!(out, "01ab");
        out.clear();
        push_hex_spaced(&mut out, &[1, 0xab]);
        assert_eq!(out, "01 ab");
        chomp(&mut out, 'b');
        assert_eq!(out, "01 a");
        chomp(&mut out, ',');
        assert_eq!(out, "01 a");
    }
}
