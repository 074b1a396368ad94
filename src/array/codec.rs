//! Byte payload codec for [`DynArray`].
//!
//! Payloads use the NumPy `.npy` layout so that arrays written by this crate
//! can be loaded by NumPy producers and consumers on the other side of a
//! node boundary, and vice versa:
//!
//! ```text
//! \x93NUMPY | major | minor | header_len (u16 LE, u32 LE for v2+) | header | data
//! ```
//!
//! The header is a Python dict literal such as
//! `{'descr': '<c16', 'fortran_order': False, 'shape': (16, 1, 4), }`, padded
//! with spaces and a newline so that the data starts on a 64-byte boundary.
//! Data is contiguous, row-major and little-endian on encode. Decoding also
//! accepts big-endian descriptors and Fortran-ordered data.

use super::{DynArray, ElementType};
use crate::error::{NiftyError, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use num_complex::Complex64;
use std::collections::HashMap;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Data offset alignment used by NumPy >= 1.14.
const HEADER_ALIGN: usize = 64;

/// Encode `array` as an NPY payload.
pub fn encode(array: &DynArray) -> Vec<u8> {
    let descr = descriptor(array.element_type());
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr,
        shape_literal(array.shape())
    );

    // Version 1.0 stores the header length in a u16; fall back to 2.0 for
    // absurdly high-rank shapes that do not fit.
    let (version, len_bytes) = if dict.len() + 1 + 10 + HEADER_ALIGN <= u16::MAX as usize {
        (1u8, 2usize)
    } else {
        (2u8, 4usize)
    };
    let prelude = MAGIC.len() + 2 + len_bytes;
    let unpadded = prelude + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;

    let data_len = array.len() * array.element_type().size();
    let mut out = Vec::with_capacity(prelude + header_len + data_len);
    out.extend_from_slice(MAGIC);
    out.push(version);
    out.push(0);
    if version == 1 {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, header_len as u16);
        out.extend_from_slice(&buf);
    } else {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, header_len as u32);
        out.extend_from_slice(&buf);
    }
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');

    let start = out.len();
    out.resize(start + data_len, 0);
    let data = &mut out[start..];
    match array {
        DynArray::Float64(a) => {
            let values: Vec<f64> = a.iter().copied().collect();
            LittleEndian::write_f64_into(&values, data);
        }
        DynArray::Complex128(a) => {
            let values: Vec<f64> = a.iter().flat_map(|c| [c.re, c.im]).collect();
            LittleEndian::write_f64_into(&values, data);
        }
        DynArray::Int64(a) => {
            let values: Vec<i64> = a.iter().copied().collect();
            LittleEndian::write_i64_into(&values, data);
        }
        DynArray::Bool(a) => {
            for (dst, v) in data.iter_mut().zip(a.iter()) {
                *dst = u8::from(*v);
            }
        }
    }
    out
}

/// Decode an NPY payload.
pub fn decode(bytes: &[u8]) -> Result<DynArray> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(NiftyError::codec(
            "payload does not appear to be NPY-format data",
        ));
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => {
            let end = 10;
            check_len(bytes, end, "header length")?;
            (LittleEndian::read_u16(&bytes[8..end]) as usize, end)
        }
        2 | 3 => {
            let end = 12;
            check_len(bytes, end, "header length")?;
            (LittleEndian::read_u32(&bytes[8..end]) as usize, end)
        }
        other => {
            return Err(NiftyError::codec(format!(
                "unsupported NPY format version {}.{}",
                other, bytes[7]
            )))
        }
    };
    let data_start = header_start
        .checked_add(header_len)
        .ok_or_else(|| NiftyError::codec("header length overflows"))?;
    check_len(bytes, data_start, "header")?;

    let header_text = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|e| NiftyError::codec(format!("header is not valid text: {}", e)))?;
    let header = Header::parse(header_text)?;

    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| NiftyError::codec("element count overflows"))?;
    let data_len = count
        .checked_mul(header.element_type.size())
        .ok_or_else(|| NiftyError::codec("data length overflows"))?;
    let data = &bytes[data_start..];
    if data.len() != data_len {
        return Err(NiftyError::codec(format!(
            "expected {} data bytes for shape {:?} of {}, found {}",
            data_len,
            header.shape,
            header.element_type,
            data.len()
        )));
    }

    let array = match (header.element_type, header.big_endian) {
        (ElementType::Float64, false) => DynArray::Float64(build(&header, read_f64s::<LittleEndian>(data))?),
        (ElementType::Float64, true) => DynArray::Float64(build(&header, read_f64s::<BigEndian>(data))?),
        (ElementType::Complex128, big) => {
            let parts = if big {
                read_f64s::<BigEndian>(data)
            } else {
                read_f64s::<LittleEndian>(data)
            };
            let values = parts
                .chunks_exact(2)
                .map(|p| Complex64::new(p[0], p[1]))
                .collect();
            DynArray::Complex128(build(&header, values)?)
        }
        (ElementType::Int64, false) => DynArray::Int64(build(&header, read_i64s::<LittleEndian>(data))?),
        (ElementType::Int64, true) => DynArray::Int64(build(&header, read_i64s::<BigEndian>(data))?),
        (ElementType::Bool, _) => {
            let values = data
                .iter()
                .map(|&b| match b {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(NiftyError::codec(format!("invalid bool byte {:#04x}", other))),
                })
                .collect::<Result<Vec<bool>>>()?;
            DynArray::Bool(build(&header, values)?)
        }
    };
    Ok(array)
}

fn check_len(bytes: &[u8], needed: usize, what: &str) -> Result<()> {
    if bytes.len() < needed {
        return Err(NiftyError::codec(format!(
            "payload truncated while reading {} ({} of {} bytes)",
            what,
            bytes.len(),
            needed
        )));
    }
    Ok(())
}

fn read_f64s<B: ByteOrder>(data: &[u8]) -> Vec<f64> {
    let mut values = vec![0.0; data.len() / 8];
    B::read_f64_into(data, &mut values);
    values
}

fn read_i64s<B: ByteOrder>(data: &[u8]) -> Vec<i64> {
    let mut values = vec![0; data.len() / 8];
    B::read_i64_into(data, &mut values);
    values
}

/// Assemble the decoded values into a row-major array.
fn build<T: Clone>(header: &Header, values: Vec<T>) -> Result<ArrayD<T>> {
    let shape = IxDyn(&header.shape);
    let array = if header.fortran_order {
        ArrayD::from_shape_vec(shape.f(), values)
    } else {
        ArrayD::from_shape_vec(shape, values)
    }
    .map_err(|e| NiftyError::codec(format!("shape {:?} rejected: {}", header.shape, e)))?;
    Ok(array.as_standard_layout().into_owned())
}

fn descriptor(element_type: ElementType) -> &'static str {
    match element_type {
        ElementType::Float64 => "<f8",
        ElementType::Complex128 => "<c16",
        ElementType::Int64 => "<i8",
        ElementType::Bool => "|b1",
    }
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// The fields of an NPY header this codec cares about.
#[derive(Debug)]
struct Header {
    element_type: ElementType,
    big_endian: bool,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    fn parse(text: &str) -> Result<Self> {
        let mut parser = LiteralParser::new(text);
        let literal = parser.literal()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(NiftyError::codec("trailing characters after NPY header"));
        }
        let mut map = match literal {
            PyLiteral::Map(m) => m,
            other => {
                return Err(NiftyError::codec(format!(
                    "expected toplevel map in NPY header but got {:?}",
                    other
                )))
            }
        };

        let descr = match map.remove("descr") {
            Some(PyLiteral::Str(s)) => s,
            other => {
                return Err(NiftyError::codec(format!(
                    "expected string item \"descr\" but got {:?}",
                    other
                )))
            }
        };
        let fortran_order = match map.remove("fortran_order") {
            Some(PyLiteral::Bool(b)) => b,
            other => {
                return Err(NiftyError::codec(format!(
                    "expected bool item \"fortran_order\" but got {:?}",
                    other
                )))
            }
        };
        let shape = match map.remove("shape") {
            Some(PyLiteral::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    PyLiteral::Int(i) if i >= 0 => Ok(i as usize),
                    other => Err(NiftyError::codec(format!(
                        "expected \"shape\" to be non-negative integers but got {:?}",
                        other
                    ))),
                })
                .collect::<Result<Vec<usize>>>()?,
            other => {
                return Err(NiftyError::codec(format!(
                    "expected tuple item \"shape\" but got {:?}",
                    other
                )))
            }
        };

        let (element_type, big_endian) = parse_descr(&descr)?;
        Ok(Self {
            element_type,
            big_endian,
            fortran_order,
            shape,
        })
    }
}

fn parse_descr(descr: &str) -> Result<(ElementType, bool)> {
    let (order, code) = match descr.chars().next() {
        Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
        _ => ('=', descr),
    };
    let element_type = match code {
        "f8" => ElementType::Float64,
        "c16" => ElementType::Complex128,
        "i8" => ElementType::Int64,
        "b1" | "?" => ElementType::Bool,
        _ => {
            return Err(NiftyError::codec(format!(
                "unsupported NPY data type \"{}\"",
                descr
            )))
        }
    };
    let big_endian = match order {
        '>' => true,
        '=' => cfg!(target_endian = "big"),
        _ => false,
    };
    Ok((element_type, big_endian))
}

/// The subset of Python literals that appear in NPY headers. Tuples and
/// lists are not distinguished.
#[derive(Debug, PartialEq)]
enum PyLiteral {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<PyLiteral>),
    Map(HashMap<String, PyLiteral>),
}

struct LiteralParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            input: text.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn error(&self, message: &str) -> NiftyError {
        NiftyError::codec(format!("bad NPY header at offset {}: {}", self.pos, message))
    }

    fn literal(&mut self) -> Result<PyLiteral> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.map(),
            Some(b'(') => self.sequence(b'(', b')'),
            Some(b'[') => self.sequence(b'[', b']'),
            Some(b'\'' | b'"') => self.string().map(PyLiteral::Str),
            Some(b'0'..=b'9' | b'-') => self.integer(),
            Some(b'T' | b'F') => self.boolean(),
            _ => Err(self.error("expected a literal")),
        }
    }

    fn string(&mut self) -> Result<String> {
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected a string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let s = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }

    fn integer(&mut self) -> Result<PyLiteral> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid integer"))?;
        let value = digits
            .parse::<i64>()
            .map_err(|_| self.error("invalid integer"))?;
        // Python 2 era headers may carry a long suffix.
        if self.peek() == Some(b'L') {
            self.pos += 1;
        }
        Ok(PyLiteral::Int(value))
    }

    fn boolean(&mut self) -> Result<PyLiteral> {
        let rest = &self.input[self.pos..];
        if rest.starts_with(b"True") {
            self.pos += 4;
            Ok(PyLiteral::Bool(true))
        } else if rest.starts_with(b"False") {
            self.pos += 5;
            Ok(PyLiteral::Bool(false))
        } else {
            Err(self.error("expected True or False"))
        }
    }

    fn sequence(&mut self, open: u8, close: u8) -> Result<PyLiteral> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(PyLiteral::List(items));
            }
            items.push(self.literal()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return Err(self.error("expected ',' or end of sequence")),
            }
        }
    }

    fn map(&mut self) -> Result<PyLiteral> {
        self.expect(b'{')?;
        let mut entries = HashMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(PyLiteral::Map(entries));
            }
            let key = self.string()?;
            self.expect(b':')?;
            let value = self.literal()?;
            entries.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {}
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array3, Dimension};
    use proptest::prelude::*;

    fn round_trip(array: &DynArray) -> DynArray {
        decode(&encode(array)).unwrap()
    }

    #[test]
    fn test_header_alignment() {
        let payload = encode(&DynArray::from(Array2::<f64>::zeros((16, 3))));
        let header_len = LittleEndian::read_u16(&payload[8..10]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGN, 0);
        assert_eq!(payload[10 + header_len - 1], b'\n');
        assert_eq!(payload.len(), 10 + header_len + 16 * 3 * 8);
    }

    #[test]
    fn test_header_text_matches_numpy() {
        let payload = encode(&DynArray::from(Array3::<Complex64>::zeros((4, 2, 1))));
        let text = std::str::from_utf8(&payload[10..]).unwrap_or("");
        assert!(text.starts_with("{'descr': '<c16', 'fortran_order': False, 'shape': (4, 2, 1), }"));

        let payload = encode(&DynArray::from(array![true, false]));
        let header_len = LittleEndian::read_u16(&payload[8..10]) as usize;
        let text = std::str::from_utf8(&payload[10..10 + header_len]).unwrap();
        assert!(text.contains("'descr': '|b1'"));
        assert!(text.contains("'shape': (2,)"));
    }

    #[test]
    fn test_scalar_round_trip() {
        let scalar = DynArray::Float64(ArrayD::from_elem(IxDyn(&[]), 2.5));
        let back = round_trip(&scalar);
        assert_eq!(back.shape(), &[] as &[usize]);
        assert!(back.bit_eq(&scalar));
    }

    #[test]
    fn test_special_floats_bit_identical() {
        let weird_nan = f64::from_bits(0x7ff8_dead_beef_0001);
        let a = DynArray::from(array![
            [f64::NAN, f64::INFINITY],
            [f64::NEG_INFINITY, -0.0],
            [weird_nan, f64::MIN_POSITIVE]
        ]);
        assert!(round_trip(&a).bit_eq(&a));
    }

    #[test]
    fn test_decode_numpy_written_payload() {
        // Bytes produced by `np.save(buf, np.arange(3, dtype=np.int64))`.
        let mut payload = b"\x93NUMPY\x01\x00v\x00".to_vec();
        let mut header = b"{'descr': '<i8', 'fortran_order': False, 'shape': (3,), }".to_vec();
        header.resize(0x76 - 1, b' ');
        header.push(b'\n');
        payload.extend_from_slice(&header);
        for v in 0i64..3 {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let decoded = decode(&payload).unwrap();
        assert_eq!(decoded.as_int64().unwrap().as_slice().unwrap(), &[0, 1, 2]);
    }

    #[test]
    fn test_decode_fortran_and_big_endian() {
        let mut payload = b"\x93NUMPY\x01\x00".to_vec();
        let header = "{'descr': '>f8', 'fortran_order': True, 'shape': (2, 3), }\n";
        payload.extend_from_slice(&(header.len() as u16).to_le_bytes());
        payload.extend_from_slice(header.as_bytes());
        // Column-major order of [[0, 1, 2], [3, 4, 5]]
        for v in [0.0f64, 3.0, 1.0, 4.0, 2.0, 5.0] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        let decoded = decode(&payload).unwrap();
        let expected = DynArray::from(array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]]);
        assert!(decoded.bit_eq(&expected));
    }

    #[test]
    fn test_corrupted_payloads() {
        let good = encode(&DynArray::from(array![1.0, 2.0]));

        assert!(matches!(decode(b"not an npy"), Err(NiftyError::Codec(_))));
        assert!(matches!(decode(&good[..good.len() - 1]), Err(NiftyError::Codec(_))));

        let mut trailing = good.clone();
        trailing.push(0);
        assert!(matches!(decode(&trailing), Err(NiftyError::Codec(_))));

        let mut bad_descr = good.clone();
        let pos = bad_descr.windows(3).position(|w| w == b"<f8").unwrap();
        bad_descr[pos + 1] = b'u';
        assert!(matches!(decode(&bad_descr), Err(NiftyError::Codec(_))));

        let mut bad_version = good;
        bad_version[6] = 9;
        assert!(matches!(decode(&bad_version), Err(NiftyError::Codec(_))));
    }

    #[test]
    fn test_invalid_bool_byte() {
        let mut payload = encode(&DynArray::from(array![true, false]));
        let last = payload.len() - 1;
        payload[last] = 7;
        assert!(matches!(decode(&payload), Err(NiftyError::Codec(_))));
    }

    fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0usize..5, 1..=3)
    }

    proptest! {
        #[test]
        fn prop_float64_round_trip(shape in shape_strategy(), seed in any::<u64>()) {
            let n: usize = shape.iter().product();
            let bits: Vec<f64> = (0..n as u64)
                .map(|i| f64::from_bits(seed.wrapping_mul(i.wrapping_add(0x9e37_79b9_7f4a_7c15))))
                .collect();
            let a = DynArray::Float64(ArrayD::from_shape_vec(IxDyn(&shape), bits).unwrap());
            prop_assert!(round_trip(&a).bit_eq(&a));
        }

        #[test]
        fn prop_complex_round_trip(shape in shape_strategy(), re in any::<f64>(), im in any::<f64>()) {
            let a = DynArray::Complex128(ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
                let k = idx.as_array_view().iter().sum::<usize>() as f64;
                Complex64::new(re * k, im - k)
            }));
            prop_assert!(round_trip(&a).bit_eq(&a));
        }

        #[test]
        fn prop_int_and_bool_round_trip(values in prop::collection::vec(any::<i64>(), 0..64)) {
            let ints = DynArray::from(ndarray::Array1::from(values.clone()));
            prop_assert!(round_trip(&ints).bit_eq(&ints));

            let bools = DynArray::from(ndarray::Array1::from_iter(values.iter().map(|v| v % 2 == 0)));
            prop_assert!(round_trip(&bools).bit_eq(&bools));
        }
    }
}
