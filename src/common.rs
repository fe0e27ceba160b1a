use byteorder::{BigEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use std::{
    fmt,
    io::{self, Cursor, Read},
};

use crate::{
    GeoError, Result,
    record::Schema,
    store::RecordKind,
};

/// Leading marker of every database file.
pub const MAGIC: &[u8; 3] = b"SxG";
/// Magic marker plus the packed fixed header.
pub const HEADER_LEN: usize = 40;
/// Width of the IP suffix stored in each block.
pub const SUFFIX_LEN: usize = 3;

/// Text encoding of the strings stored in the record sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    Cp1251,
    Unknown(u8),
}

impl Charset {
    fn from_code(code: u8) -> Self {
        match code {
            0 => Charset::Utf8,
            1 => Charset::Latin1,
            2 => Charset::Cp1251,
            other => Charset::Unknown(other),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Utf8 => f.write_str("utf-8"),
            Charset::Latin1 => f.write_str("latin1"),
            Charset::Cp1251 => f.write_str("cp1251"),
            Charset::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Database edition declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Unspecified,
    Country,
    CityRu,
    CityEn,
    City,
    CityMaxRu,
    CityMaxEn,
    CityMax,
    Unknown(u8),
}

impl DbKind {
    fn from_code(code: u8) -> Self {
        match code {
            0 => DbKind::Unspecified,
            1 => DbKind::Country,
            2 => DbKind::CityRu,
            3 => DbKind::CityEn,
            4 => DbKind::City,
            5 => DbKind::CityMaxRu,
            6 => DbKind::CityMaxEn,
            7 => DbKind::CityMax,
            other => DbKind::Unknown(other),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbKind::Unspecified => "n/a",
            DbKind::Country => "SxGeo Country",
            DbKind::CityRu => "SxGeo City RU",
            DbKind::CityEn => "SxGeo City EN",
            DbKind::City => "SxGeo City",
            DbKind::CityMaxRu => "SxGeo City Max RU",
            DbKind::CityMaxEn => "SxGeo City Max EN",
            DbKind::CityMax => "SxGeo City Max",
            DbKind::Unknown(code) => return write!(f, "unknown ({code})"),
        };
        f.write_str(name)
    }
}

/// Fixed header that follows the magic marker.
///
/// All fields are stored big-endian and packed without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub timestamp: u32,
    pub db_type: u8,
    pub charset: u8,
    pub byte_index_len: u8,
    pub main_index_len: u16,
    pub range: u16,
    pub block_count: u32,
    pub seek_width: u8,
    pub max_region_len: u16,
    pub max_city_len: u16,
    pub region_section_size: u32,
    pub city_section_size: u32,
    pub max_country_len: u16,
    pub country_section_size: u32,
    pub schema_blob_size: u16,
}

impl Header {
    /// Parse and validate the leading [`HEADER_LEN`] bytes of a database.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(GeoError::InvalidMagic);
        }
        let mut cursor = Cursor::new(&bytes[MAGIC.len()..]);
        let header = Header {
            version: cursor.read_u8()?,
            timestamp: cursor.read_u32::<BigEndian>()?,
            db_type: cursor.read_u8()?,
            charset: cursor.read_u8()?,
            byte_index_len: cursor.read_u8()?,
            main_index_len: cursor.read_u16::<BigEndian>()?,
            range: cursor.read_u16::<BigEndian>()?,
            block_count: cursor.read_u32::<BigEndian>()?,
            seek_width: cursor.read_u8()?,
            max_region_len: cursor.read_u16::<BigEndian>()?,
            max_city_len: cursor.read_u16::<BigEndian>()?,
            region_section_size: cursor.read_u32::<BigEndian>()?,
            city_section_size: cursor.read_u32::<BigEndian>()?,
            max_country_len: cursor.read_u16::<BigEndian>()?,
            country_section_size: cursor.read_u32::<BigEndian>()?,
            schema_blob_size: cursor.read_u16::<BigEndian>()?,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        let mandatory = [
            ("byte index length", self.byte_index_len as u64),
            ("main index length", self.main_index_len as u64),
            ("range", self.range as u64),
            ("block count", self.block_count as u64),
            ("seek width", self.seek_width as u64),
            ("timestamp", self.timestamp as u64),
        ];
        if let Some((name, _)) = mandatory.iter().find(|(_, value)| *value == 0) {
            return Err(GeoError::InvalidHeader(*name));
        }
        if self.seek_width > 4 {
            return Err(GeoError::InvalidHeader("seek width"));
        }
        Ok(())
    }

    /// Bytes per IP-block record: the 3-byte suffix plus the seek pointer.
    pub fn block_width(&self) -> usize {
        SUFFIX_LEN + self.seek_width as usize
    }

    /// True when the database carries city-level records.
    pub fn has_cities(&self) -> bool {
        self.max_city_len != 0
    }

    /// Upper bound on the encoded size of one record of `kind`.
    pub fn max_record_len(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Country => self.max_country_len as usize,
            RecordKind::Region => self.max_region_len as usize,
            RecordKind::City => self.max_city_len as usize,
        }
    }

    /// Build time of the database, if the timestamp is representable.
    ///
    /// 返回数据库的生成时间。
    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp as i64, 0)
    }

    /// Text encoding of the record strings.
    ///
    /// 返回记录字符串的编码。
    pub fn charset(&self) -> Charset {
        Charset::from_code(self.charset)
    }

    /// Database edition.
    ///
    /// 返回数据库版本类型。
    pub fn kind(&self) -> DbKind {
        DbKind::from_code(self.db_type)
    }
}

/// Byte layout of everything that follows the indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Absolute file offset of the IP-block table.
    pub blocks_begin: u64,
    pub blocks_len: u64,
    pub region_len: u64,
    pub city_len: u64,
}

impl Geometry {
    fn new(header: &Header) -> Self {
        let blocks_begin = HEADER_LEN as u64
            + header.schema_blob_size as u64
            + header.byte_index_len as u64 * 4
            + header.main_index_len as u64 * 4;
        Geometry {
            blocks_begin,
            blocks_len: header.block_count as u64 * header.block_width() as u64,
            region_len: header.region_section_size as u64,
            city_len: header.city_section_size as u64,
        }
    }

    /// Length of the table plus both record sections.
    pub fn body_len(&self) -> u64 {
        self.blocks_len + self.region_len + self.city_len
    }

    /// Offset of the region section, relative to the start of the block table.
    pub fn regions_begin(&self) -> u64 {
        self.blocks_len
    }

    /// Offset of the city section, relative to the start of the block table.
    pub fn cities_begin(&self) -> u64 {
        self.blocks_len + self.region_len
    }

    /// Reject files that end before the last declared section does.
    pub fn check_file_len(&self, file_len: u64) -> Result<()> {
        if file_len < self.blocks_begin + self.body_len() {
            return Err(GeoError::TruncatedData);
        }
        Ok(())
    }
}

/// Everything that precedes the IP-block table, parsed.
#[derive(Debug)]
pub struct Preamble {
    pub header: Header,
    pub schemas: Option<[Schema; 3]>,
    pub byte_index: Vec<u8>,
    pub main_index: Vec<u8>,
    pub geometry: Geometry,
}

/// `read_exact` that reports a short read as a truncated database.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => GeoError::TruncatedData,
        _ => GeoError::DatabaseFileReadError(err),
    })
}

/// Read the header, schema blob and both raw indexes from the start of a database.
///
/// The reader is left positioned at the first IP block.
pub fn read_preamble<R: Read>(reader: &mut R) -> Result<Preamble> {
    let mut fixed = [0u8; HEADER_LEN];
    read_full(reader, &mut fixed)?;
    let header = Header::parse(&fixed)?;

    let mut blob = vec![0u8; header.schema_blob_size as usize];
    read_full(reader, &mut blob)?;
    let schemas = parse_schema_blob(&blob)?;

    let mut byte_index = vec![0u8; header.byte_index_len as usize * 4];
    read_full(reader, &mut byte_index)?;
    let mut main_index = vec![0u8; header.main_index_len as usize * 4];
    read_full(reader, &mut main_index)?;

    let geometry = Geometry::new(&header);
    Ok(Preamble {
        header,
        schemas,
        byte_index,
        main_index,
        geometry,
    })
}

/// Split the NUL-separated blob into the country, region and city schemas.
///
/// An empty blob marks a country-only database.
pub fn parse_schema_blob(blob: &[u8]) -> Result<Option<[Schema; 3]>> {
    if blob.is_empty() {
        return Ok(None);
    }
    let text = std::str::from_utf8(blob)
        .map_err(|_| GeoError::MalformedSchema("schema blob is not valid UTF-8".into()))?;
    let mut parts = text.split('\0');
    let mut next = || -> Result<Schema> {
        let part = parts
            .next()
            .ok_or_else(|| GeoError::MalformedSchema(format!("expected 3 schemas in {text:?}")))?;
        Schema::parse(part)
    };
    Ok(Some([next()?, next()?, next()?]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Header bytes with every mandatory field set to a small non-zero value.
    pub(crate) fn header_bytes() -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..3].copy_from_slice(MAGIC);
        bytes[3] = 22; // version
        bytes[4..8].copy_from_slice(&1_500_000_000u32.to_be_bytes());
        bytes[8] = 4; // type
        bytes[9] = 0; // charset
        bytes[10] = 224; // byte index length
        bytes[11..13].copy_from_slice(&1775u16.to_be_bytes());
        bytes[13..15].copy_from_slice(&3300u16.to_be_bytes());
        bytes[15..19].copy_from_slice(&5_000_000u32.to_be_bytes());
        bytes[19] = 3; // seek width
        bytes[20..22].copy_from_slice(&90u16.to_be_bytes());
        bytes[22..24].copy_from_slice(&120u16.to_be_bytes());
        bytes[24..28].copy_from_slice(&110_000u32.to_be_bytes());
        bytes[28..32].copy_from_slice(&2_600_000u32.to_be_bytes());
        bytes[32..34].copy_from_slice(&150u16.to_be_bytes());
        bytes[34..38].copy_from_slice(&9_000u32.to_be_bytes());
        bytes[38..40].copy_from_slice(&0u16.to_be_bytes());
        bytes
    }

    #[test]
    fn parses_big_endian_fields() {
        let header = Header::parse(&header_bytes()).unwrap();
        assert_eq!(header.version, 22);
        assert_eq!(header.byte_index_len, 224);
        assert_eq!(header.main_index_len, 1775);
        assert_eq!(header.range, 3300);
        assert_eq!(header.block_count, 5_000_000);
        assert_eq!(header.block_width(), 6);
        assert_eq!(header.max_city_len, 120);
        assert_eq!(header.country_section_size, 9_000);
        assert!(header.has_cities());
        assert_eq!(header.kind(), DbKind::City);
        assert_eq!(header.charset().to_string(), "utf-8");
        assert_eq!(
            header.created().unwrap().format("%Y.%m.%d").to_string(),
            "2017.07.14"
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes();
        bytes[0] = b'X';
        assert!(matches!(Header::parse(&bytes), Err(GeoError::InvalidMagic)));
    }

    #[test]
    fn rejects_zero_mandatory_fields() {
        for (offset, len, name) in [
            (10usize, 1usize, "byte index length"),
            (11, 2, "main index length"),
            (13, 2, "range"),
            (15, 4, "block count"),
            (19, 1, "seek width"),
            (4, 4, "timestamp"),
        ] {
            let mut bytes = header_bytes();
            bytes[offset..offset + len].fill(0);
            match Header::parse(&bytes) {
                Err(GeoError::InvalidHeader(field)) => assert_eq!(field, name),
                other => panic!("expected InvalidHeader({name}), got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_wide_seek_pointers() {
        let mut bytes = header_bytes();
        bytes[19] = 5;
        assert!(matches!(
            Header::parse(&bytes),
            Err(GeoError::InvalidHeader("seek width"))
        ));
    }

    #[test]
    fn geometry_follows_indexes() {
        let header = Header::parse(&header_bytes()).unwrap();
        let geometry = Geometry::new(&header);
        assert_eq!(geometry.blocks_begin, 40 + 224 * 4 + 1775 * 4);
        assert_eq!(geometry.regions_begin(), 5_000_000 * 6);
        assert_eq!(geometry.cities_begin(), 5_000_000 * 6 + 110_000);
        assert!(geometry.check_file_len(geometry.blocks_begin).is_err());
    }

    #[test]
    fn short_preamble_is_truncated() {
        let bytes = header_bytes();
        let mut reader = Cursor::new(&bytes[..]);
        assert!(matches!(
            read_preamble(&mut reader),
            Err(GeoError::TruncatedData)
        ));
    }

    #[test]
    fn schema_blob_needs_three_entries() {
        assert!(parse_schema_blob(b"").unwrap().is_none());
        let schemas = parse_schema_blob(b"T:id\0M:country_seek\0M:region_seek").unwrap();
        assert_eq!(schemas.unwrap()[2].fields()[0].name, "region_seek");
        assert!(matches!(
            parse_schema_blob(b"T:id\0M:country_seek"),
            Err(GeoError::MalformedSchema(_))
        ));
    }
}
