//! Tag reader contract and payload translation
//!
//! Tags carry a share URL. The reader hands over the raw bytes starting at
//! page [`FIRST_PAGE`]; the URL path begins at [`URI_START_OFFSET`] and runs
//! until a terminator byte. Path separators are rewritten into the content
//! identifier form, so `playlist/37i9dQZF1DXcBWIGoYBM5M` becomes
//! `spotify:playlist:37i9dQZF1DXcBWIGoYBM5M`.

use core::fmt;

use heapless::String;

/// First tag page holding URL data
pub const FIRST_PAGE: u8 = 0x06;

/// Pages covered by one 16 byte read
pub const PAGES_PER_READ: u8 = 4;

/// Bytes returned by one read command
pub const BYTES_PER_READ: usize = 16;

/// Number of consecutive reads making up a payload
pub const READS_PER_PAYLOAD: usize = 6;

/// Size of the raw payload handed to the translator
pub const PAYLOAD_LEN: usize = BYTES_PER_READ * READS_PER_PAYLOAD;

/// Offset of the URL path inside the payload
pub const URI_START_OFFSET: usize = 26;

/// NDEF TLV terminator
const TERMINATOR: u8 = 0xFE;

pub const CONTENT_SCHEME: &str = "spotify";

/// Capacity of a translated identifier
pub const CONTENT_ID_CAPACITY: usize = 96;

pub type TagPayload = [u8; PAYLOAD_LEN];

/// Tag reader errors and translation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagError {
    /// The reader chip did not answer
    ReaderUnavailable,
    /// A read command failed on the bus or the tag left the field
    ReadFailed,
    /// No terminator before the end of the payload
    Unterminated,
    /// Terminator found but nothing before it
    Empty,
    /// Non printable byte inside the path
    InvalidByte(u8),
    /// Path does not name a known content kind and id
    UnrecognizedPath,
    /// Identifier longer than [`CONTENT_ID_CAPACITY`]
    TooLong,
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagError::ReaderUnavailable => f.write_str("tag reader not detected"),
            TagError::ReadFailed => f.write_str("tag read failed"),
            TagError::Unterminated => f.write_str("no terminator found on tag"),
            TagError::Empty => f.write_str("tag holds no identifier"),
            TagError::InvalidByte(b) => write!(f, "invalid byte 0x{:02x} on tag", b),
            TagError::UnrecognizedPath => f.write_str("no valid content identifier found on tag"),
            TagError::TooLong => f.write_str("identifier on tag is too long"),
        }
    }
}

/// Presence detection and raw reads, implemented by the board
pub trait TagReader {
    /// Bring up the reader chip
    fn init(&mut self) -> Result<(), TagError>;

    /// Edge triggered: true once per newly presented tag
    fn is_tag_present(&mut self) -> bool;

    /// Read [`PAYLOAD_LEN`] bytes starting at [`FIRST_PAGE`]
    fn read_payload(&mut self, payload: &mut TagPayload) -> Result<(), TagError>;

    /// Halt the tag so it does not retrigger while it stays in the field
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Playlist,
    Album,
    Track,
    Artist,
    Show,
    Episode,
}

impl ContentKind {
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "playlist" => Some(ContentKind::Playlist),
            "album" => Some(ContentKind::Album),
            "track" => Some(ContentKind::Track),
            "artist" => Some(ContentKind::Artist),
            "show" => Some(ContentKind::Show),
            "episode" => Some(ContentKind::Episode),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Playlist => "playlist",
            ContentKind::Album => "album",
            ContentKind::Track => "track",
            ContentKind::Artist => "artist",
            ContentKind::Show => "show",
            ContentKind::Episode => "episode",
        }
    }

    /// Single items are queued directly, everything else is a context
    pub fn is_single_item(self) -> bool {
        matches!(self, ContentKind::Track | ContentKind::Episode)
    }

    /// Contexts that accept a start offset
    pub fn accepts_offset(self) -> bool {
        matches!(self, ContentKind::Playlist | ContentKind::Album)
    }
}

/// Normalized content identifier, e.g. `spotify:album:ID`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentId {
    kind: ContentKind,
    uri: String<CONTENT_ID_CAPACITY>,
}

impl ContentId {
    /// Parse an identifier that is already in `scheme:kind:id` form
    pub fn parse(uri: &str) -> Result<Self, TagError> {
        let rest = uri
            .strip_prefix(CONTENT_SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or(TagError::UnrecognizedPath)?;
        let (kind, id) = rest.split_once(':').ok_or(TagError::UnrecognizedPath)?;
        let kind = ContentKind::from_segment(kind).ok_or(TagError::UnrecognizedPath)?;
        if id.is_empty() || id.contains(':') || id.contains('/') {
            return Err(TagError::UnrecognizedPath);
        }

        let mut owned = String::new();
        owned.push_str(uri).map_err(|_| TagError::TooLong)?;
        Ok(Self { kind, uri: owned })
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        self.uri.as_str()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translate a raw tag payload into a content identifier.
///
/// A payload without terminator is rejected rather than truncated.
pub fn translate_payload(payload: &[u8]) -> Result<ContentId, TagError> {
    let body = payload
        .get(URI_START_OFFSET..)
        .ok_or(TagError::Unterminated)?;
    let end = body
        .iter()
        .position(|&b| b == TERMINATOR || b == 0x00)
        .ok_or(TagError::Unterminated)?;

    let mut path = &body[..end];
    // share links carry tracking parameters
    if let Some(query) = path.iter().position(|&b| b == b'?') {
        path = &path[..query];
    }
    while let [b'/', rest @ ..] = path {
        path = rest;
    }
    while let [rest @ .., b'/'] = path {
        path = rest;
    }
    if path.is_empty() {
        return Err(TagError::Empty);
    }
    if let Some(&bad) = path.iter().find(|b| !b.is_ascii_graphic()) {
        return Err(TagError::InvalidByte(bad));
    }

    let mut uri: String<CONTENT_ID_CAPACITY> = String::new();
    uri.push_str(CONTENT_SCHEME).map_err(|_| TagError::TooLong)?;
    uri.push(':').map_err(|_| TagError::TooLong)?;
    for &b in path {
        let c = if b == b'/' { ':' } else { b as char };
        uri.push(c).map_err(|_| TagError::TooLong)?;
    }

    ContentId::parse(&uri)
}
