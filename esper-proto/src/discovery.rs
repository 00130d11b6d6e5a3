//! Discovery packet codec: fixed-layout, little-endian, byte-exact.
//!
//! ASCII fields occupy fixed-width slots, zero-filled on encode and
//! right-trimmed of space/tab/CR/LF/NUL on decode. All slot widths live in
//! this module so the encoder and the decoder cannot drift apart.

use std::net::Ipv4Addr;

/// First four bytes of every discovery datagram.
pub const MAGIC: [u8; 4] = *b"ESPR";
/// ESPER API version carried in request headers.
pub const API_VERSION: u8 = 2;
/// Discovery UDP protocol revision; responses carrying any other value are rejected.
pub const UDP_VERSION: u8 = 0;
/// UDP port devices listen on for discovery broadcasts.
pub const DISCOVERY_PORT: u16 = 27500;

const CATEGORY_DISCOVERY: u8 = 0;
const TYPE_DISCOVERY_REQUEST: u8 = 0;

const PRESENT: u8 = 0xff;
const ABSENT: u8 = 0x00;

// Shared slot widths (the wire contract).
const AUTH_TOKEN_LEN: usize = 8;
const DEVICE_TYPE_LEN: usize = 64;
const DEVICE_NAME_LEN: usize = 64;
const DEVICE_REVISION_LEN: usize = 64;
const HARDWARE_ID_LEN: usize = 128;
const RESPONSE_NAME_LEN: usize = 64;
const RESPONSE_TYPE_LEN: usize = 64;
const RESPONSE_REVISION_LEN: usize = 32;
const RESPONSE_RESERVED_LEN: usize = 12;
const RESPONSE_URL_LEN: usize = 64;

/// Total request packet length in bytes.
pub const REQUEST_LEN: usize = 4 + 1 + 1 + 1 + 1 + 4 + AUTH_TOKEN_LEN // header
    + 1 // reserved
    + 1 + 4 // device id filter
    + 1 + DEVICE_TYPE_LEN
    + 1 + DEVICE_NAME_LEN
    + 1 + DEVICE_REVISION_LEN
    + 1 + HARDWARE_ID_LEN;

/// Total response packet length in bytes.
pub const RESPONSE_LEN: usize = 4 + 1 + 1 + 4
    + RESPONSE_NAME_LEN
    + RESPONSE_TYPE_LEN
    + RESPONSE_REVISION_LEN
    + HARDWARE_ID_LEN
    + 4
    + RESPONSE_RESERVED_LEN
    + 4
    + 2
    + RESPONSE_URL_LEN;

/// Optional match criteria carried in a discovery request. A `None` (or
/// empty) field is encoded with its presence flag cleared and the slot
/// zero-filled; responders then skip that check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub device_id: Option<u32>,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub device_revision: Option<String>,
    pub hardware_id: Option<String>,
}

/// One discovery request: the filter set plus per-send header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    pub message_id: u32,
    pub auth_token: String,
    pub filter: DiscoveryFilter,
}

impl DiscoveryRequest {
    /// Build a request with a freshly randomized message ID.
    pub fn new(filter: DiscoveryFilter, auth_token: &str) -> Self {
        Self {
            message_id: rand::random(),
            auth_token: auth_token.to_string(),
            filter,
        }
    }
}

/// One device's answer to a discovery broadcast. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub api_version: u8,
    pub udp_version: u8,
    pub module_id: u32,
    pub name: String,
    pub device_type: String,
    pub revision: String,
    pub hardware_id: String,
    pub uptime_secs: u32,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub url: String,
}

/// Why a datagram was not a discovery response. Callers collecting broadcast
/// replies drop these and keep listening; none of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short: {got} bytes, need {need}")]
    Truncated { got: usize, need: usize },
    #[error("bad magic")]
    BadMagic,
    #[error("unexpected udp version {0}")]
    UnexpectedVersion(u8),
    #[error("{field} is not ascii")]
    NotAscii { field: &'static str },
}

struct SlotWriter {
    buf: Vec<u8>,
}

impl SlotWriter {
    fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write `s` into a fixed-width slot, truncating if too long and
    /// zero-filling the remainder.
    fn put_ascii(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + (width - n), 0);
    }

    fn put_reserved(&mut self, width: usize) {
        self.buf.resize(self.buf.len() + width, 0);
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reader over a buffer whose length was checked up front.
struct SlotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SlotReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn take_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn take_u16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn take_u32(&mut self) -> u32 {
        let b = self.take(4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Read a fixed-width ASCII slot and right-trim the padding set.
    fn take_ascii(&mut self, width: usize, field: &'static str) -> Result<String, DecodeError> {
        let raw = self.take(width);
        if !raw.is_ascii() {
            return Err(DecodeError::NotAscii { field });
        }
        let end = raw
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0))
            .map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

fn presence(present: bool) -> u8 {
    if present {
        PRESENT
    } else {
        ABSENT
    }
}

fn put_text_filter(w: &mut SlotWriter, value: Option<&str>, width: usize) {
    let value = value.unwrap_or("");
    w.put_u8(presence(!value.is_empty()));
    w.put_ascii(value, width);
}

/// Encode a discovery request into its fixed wire form ([`REQUEST_LEN`] bytes).
pub fn encode_request(req: &DiscoveryRequest) -> Vec<u8> {
    let mut w = SlotWriter::with_capacity(REQUEST_LEN);
    w.put_bytes(&MAGIC);
    w.put_u8(API_VERSION);
    w.put_u8(UDP_VERSION);
    w.put_u8(CATEGORY_DISCOVERY);
    w.put_u8(TYPE_DISCOVERY_REQUEST);
    w.put_u32(req.message_id);
    w.put_ascii(&req.auth_token, AUTH_TOKEN_LEN);

    w.put_u8(0); // reserved
    w.put_u8(presence(req.filter.device_id.is_some()));
    w.put_u32(req.filter.device_id.unwrap_or(0));
    put_text_filter(&mut w, req.filter.device_type.as_deref(), DEVICE_TYPE_LEN);
    put_text_filter(&mut w, req.filter.device_name.as_deref(), DEVICE_NAME_LEN);
    put_text_filter(
        &mut w,
        req.filter.device_revision.as_deref(),
        DEVICE_REVISION_LEN,
    );
    put_text_filter(&mut w, req.filter.hardware_id.as_deref(), HARDWARE_ID_LEN);
    w.finish()
}

/// Encode a discovery response; the responder-side counterpart of
/// [`decode_response`].
pub fn encode_response(resp: &DiscoveryResponse) -> Vec<u8> {
    let mut w = SlotWriter::with_capacity(RESPONSE_LEN);
    w.put_bytes(&MAGIC);
    w.put_u8(resp.api_version);
    w.put_u8(resp.udp_version);
    w.put_u32(resp.module_id);
    w.put_ascii(&resp.name, RESPONSE_NAME_LEN);
    w.put_ascii(&resp.device_type, RESPONSE_TYPE_LEN);
    w.put_ascii(&resp.revision, RESPONSE_REVISION_LEN);
    w.put_ascii(&resp.hardware_id, HARDWARE_ID_LEN);
    w.put_u32(resp.uptime_secs);
    w.put_reserved(RESPONSE_RESERVED_LEN);
    w.put_u32(u32::from(resp.ip));
    w.put_u16(resp.port);
    w.put_ascii(&resp.url, RESPONSE_URL_LEN);
    w.finish()
}

/// Decode a discovery response packet. Fails (does not panic) on short
/// buffers, bad magic, an unexpected protocol revision, or non-ASCII text.
pub fn decode_response(bytes: &[u8]) -> Result<DiscoveryResponse, DecodeError> {
    if bytes.len() < RESPONSE_LEN {
        return Err(DecodeError::Truncated {
            got: bytes.len(),
            need: RESPONSE_LEN,
        });
    }
    let mut r = SlotReader::new(bytes);
    if r.take(4) != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let api_version = r.take_u8();
    let udp_version = r.take_u8();
    if udp_version != UDP_VERSION {
        return Err(DecodeError::UnexpectedVersion(udp_version));
    }
    let module_id = r.take_u32();
    let name = r.take_ascii(RESPONSE_NAME_LEN, "name")?;
    let device_type = r.take_ascii(RESPONSE_TYPE_LEN, "type")?;
    let revision = r.take_ascii(RESPONSE_REVISION_LEN, "revision")?;
    let hardware_id = r.take_ascii(HARDWARE_ID_LEN, "hardware id")?;
    let uptime_secs = r.take_u32();
    r.skip(RESPONSE_RESERVED_LEN);
    let ip = Ipv4Addr::from(r.take_u32());
    let port = r.take_u16();
    let url = r.take_ascii(RESPONSE_URL_LEN, "url")?;
    Ok(DiscoveryResponse {
        api_version,
        udp_version,
        module_id,
        name,
        device_type,
        revision,
        hardware_id,
        uptime_secs,
        ip,
        port,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> DiscoveryResponse {
        DiscoveryResponse {
            api_version: API_VERSION,
            udp_version: UDP_VERSION,
            module_id: 7,
            name: "griffin".to_string(),
            device_type: "digitizer".to_string(),
            revision: "2.4.1".to_string(),
            hardware_id: "00:0a:35:01:02:03".to_string(),
            uptime_secs: 86_400,
            ip: Ipv4Addr::new(192, 168, 1, 42),
            port: 8080,
            url: "http://192.168.1.42:8080".to_string(),
        }
    }

    #[test]
    fn packet_lengths() {
        assert_eq!(REQUEST_LEN, 350);
        assert_eq!(RESPONSE_LEN, 384);
        let req = DiscoveryRequest::new(DiscoveryFilter::default(), "");
        assert_eq!(encode_request(&req).len(), REQUEST_LEN);
        assert_eq!(encode_response(&sample_response()).len(), RESPONSE_LEN);
    }

    #[test]
    fn response_roundtrip() {
        let resp = sample_response();
        let decoded = decode_response(&encode_response(&resp)).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn roundtrip_trims_padding() {
        let mut bytes = encode_response(&sample_response());
        // Rewrite the tail of the name slot with the full padding set; the
        // decoder must strip all of it.
        let name_start = 4 + 1 + 1 + 4;
        bytes[name_start..name_start + 12].copy_from_slice(b"pad \t\r\n\0\0\0\0\0");
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded.name, "pad");
    }

    #[test]
    fn request_header_layout() {
        let req = DiscoveryRequest {
            message_id: 0x0403_0201,
            auth_token: "tok".to_string(),
            filter: DiscoveryFilter::default(),
        };
        let bytes = encode_request(&req);
        assert_eq!(&bytes[0..4], b"ESPR");
        assert_eq!(bytes[4], API_VERSION);
        assert_eq!(bytes[5], UDP_VERSION);
        assert_eq!(bytes[6], 0); // category
        assert_eq!(bytes[7], 0); // type
        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]); // message id LE
        assert_eq!(&bytes[12..20], b"tok\0\0\0\0\0");
    }

    #[test]
    fn request_filter_flags_and_slots() {
        let req = DiscoveryRequest {
            message_id: 0,
            auth_token: String::new(),
            filter: DiscoveryFilter {
                device_id: Some(9),
                device_type: None,
                device_name: Some("grif-1".to_string()),
                device_revision: Some(String::new()),
                hardware_id: None,
            },
        };
        let bytes = encode_request(&req);
        assert_eq!(bytes[20], 0); // reserved
        assert_eq!(bytes[21], 0xff); // device id present
        assert_eq!(&bytes[22..26], &[9, 0, 0, 0]);
        assert_eq!(bytes[26], 0x00); // device type absent
        assert!(bytes[27..91].iter().all(|&b| b == 0));
        assert_eq!(bytes[91], 0xff); // device name present
        assert_eq!(&bytes[92..98], b"grif-1");
        assert!(bytes[98..156].iter().all(|&b| b == 0));
        assert_eq!(bytes[156], 0x00); // empty revision counts as absent
        assert_eq!(bytes[221], 0x00); // hardware id absent
    }

    #[test]
    fn overlong_fields_are_truncated_to_slot() {
        let req = DiscoveryRequest {
            message_id: 0,
            auth_token: "much-too-long-token".to_string(),
            filter: DiscoveryFilter {
                device_name: Some("n".repeat(200)),
                ..DiscoveryFilter::default()
            },
        };
        let bytes = encode_request(&req);
        assert_eq!(bytes.len(), REQUEST_LEN);
        assert_eq!(&bytes[12..20], b"much-too");
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let bytes = encode_response(&sample_response());
        for n in [0, 3, 4, 100, RESPONSE_LEN - 1] {
            assert!(matches!(
                decode_response(&bytes[..n]),
                Err(DecodeError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut bytes = encode_response(&sample_response());
        bytes[0] = b'X';
        assert_eq!(decode_response(&bytes), Err(DecodeError::BadMagic));
    }

    #[test]
    fn decode_rejects_unexpected_version() {
        let mut bytes = encode_response(&sample_response());
        bytes[5] = UDP_VERSION + 1;
        assert_eq!(
            decode_response(&bytes),
            Err(DecodeError::UnexpectedVersion(UDP_VERSION + 1))
        );
    }

    #[test]
    fn decode_rejects_non_ascii_text() {
        let mut bytes = encode_response(&sample_response());
        let name_start = 4 + 1 + 1 + 4;
        bytes[name_start] = 0xc3;
        assert_eq!(
            decode_response(&bytes),
            Err(DecodeError::NotAscii { field: "name" })
        );
    }

    #[test]
    fn ip_field_is_presentation_order() {
        let resp = sample_response();
        let bytes = encode_response(&resp);
        let ip_start = RESPONSE_LEN - RESPONSE_URL_LEN - 2 - 4;
        // u32 form of 192.168.1.42, little-endian on the wire.
        let expected = u32::from(Ipv4Addr::new(192, 168, 1, 42)).to_le_bytes();
        assert_eq!(&bytes[ip_start..ip_start + 4], &expected);
    }

    #[test]
    fn garbage_never_decodes() {
        assert!(decode_response(&[0u8; 10]).is_err());
        assert!(decode_response(&[0xffu8; RESPONSE_LEN]).is_err());
    }
}
