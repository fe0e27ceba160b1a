//! # SxGeo Database Library
//!
//! A Rust library for reading and querying Sypex Geo (SxGeo) IPv4 geolocation databases.
//!
//! ## Features
//! - Country and city editions, including the region and country records a city refers to.
//! - Three-level lookup: per-octet byte index, granule index, then binary search over the IP-block table.
//! - Streamed (file), preloaded (memory) and pre-parsed index (batch) modes, freely combined.
//! - Optional memory-mapped file support (`mmap` feature).
//!
//! ## Usage
//!
//! 1. Open a database, choosing how it is backed:
//! ```rust,ignore
//! use sxgeo::{Mode, Resolver};
//!
//! let db = Resolver::open("path/to/SxGeoCity.dat", Mode::MEMORY | Mode::BATCH)
//!     .expect("Failed to load database");
//! ```
//!
//! 2. Query an address:
//! ```rust,ignore
//! let iso = db.country("8.8.8.8")?;
//! if let Some(found) = db.city_full("77.88.55.60")? {
//!     println!("{:?} in {:?}", found.city.get_str("name_en"), found.country.get_str("iso"));
//! } else {
//!     println!("No location data found");
//! }
//! ```
//!
//! ## Error Handling
//! The following errors might occur when loading the database:
//! - `DatabaseFileReadError`: Failed to read the database file.
//! - `InvalidMagic`: The file does not start with the `SxG` marker.
//! - `InvalidHeader`: A mandatory header field is zero or out of range.
//! - `MalformedSchema` / `InvalidFieldType`: A record format string cannot be parsed.
//! - `TruncatedData`: The file or a record ends before its declared length.
//!
//! Addresses that are malformed, reserved (`0.x`, `10.x`, `127.x`) or simply
//! absent are not errors: lookups return 0, an empty code, or `None`.
//!
//! ## Notes
//! - Only IPv4 is supported.
//! - Every mode returns identical answers; they differ only in load time,
//!   memory use and per-query I/O.
//!
//! # SxGeo 数据库解析库
//!
//! 这是一个用于读取和查询 Sypex Geo (SxGeo) IPv4 地理位置数据库的 Rust 库。
//!
//! ## 功能
//! - 支持国家版与城市版数据库，可解析城市所属的地区与国家记录。
//! - 三级查找：首字节索引、分段索引，再对 IP 段表做二分查找。
//! - 支持流式读取（file）、预加载（memory）与预解析索引（batch）模式，可自由组合。
//! - 可选的 mmap 支持（`mmap` feature）。
//!
//! ## 使用方法
//!
//! 1. 打开数据库并选择加载方式：
//! ```rust,ignore
//! use sxgeo::{Mode, Resolver};
//!
//! let db = Resolver::open("path/to/SxGeoCity.dat", Mode::MEMORY | Mode::BATCH)
//!     .expect("Failed to load database");
//! ```
//!
//! 2. 查询地址：
//! ```rust,ignore
//! let iso = db.country("8.8.8.8")?;
//! if let Some(found) = db.city_full("77.88.55.60")? {
//!     println!("{:?} in {:?}", found.city.get_str("name_en"), found.country.get_str("iso"));
//! } else {
//!     println!("No location data found");
//! }
//! ```
//!
//! ## 错误处理
//! 加载数据库时可能会遇到以下错误：
//! - `DatabaseFileReadError`: 数据库文件读取失败。
//! - `InvalidMagic`: 文件不以 `SxG` 标记开头。
//! - `InvalidHeader`: 必填的文件头字段为零或超出范围。
//! - `MalformedSchema` / `InvalidFieldType`: 记录格式字符串无法解析。
//! - `TruncatedData`: 文件或记录在声明的长度之前结束。
//!
//! 格式错误、保留段（`0.x`、`10.x`、`127.x`）或不存在的地址不会报错：
//! 查询返回 0、空代码或 `None`。
//!
//! ## 注意事项
//! - 仅支持 IPv4。
//! - 所有模式返回相同的结果，只在加载时间、内存占用和每次查询的 I/O 上有所不同。

mod blocks;
mod common;
mod country;
mod disk;
mod index;
mod memory;
#[cfg(feature = "mmap")]
mod mmap;
mod record;
mod resolver;
mod store;

use std::ops::{BitOr, BitOrAssign};

pub use common::{Charset, DbKind, Header};
pub use country::{COUNTRY_COUNT, ID2ISO, iso_code};
pub use record::{Field, FieldKind, Record, Schema, Value};
pub use resolver::{City, CityFull, CountryRef, Lookup, Resolver};
pub use store::{RecordKind, Section};

/// Enum representing possible errors in SxGeo database operations.
///
/// SxGeo 数据库操作中可能出现的错误。
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Failed to read the database file: {0}")]
    DatabaseFileReadError(#[from] std::io::Error),
    #[error("Invalid file start: missing SxG marker")]
    InvalidMagic,
    #[error("Invalid file format: bad {0}")]
    InvalidHeader(&'static str),
    #[error("Malformed record schema: {0}")]
    MalformedSchema(String),
    #[error("Invalid field type code {0:?}")]
    InvalidFieldType(char),
    #[error("The database file is truncated or contains invalid offsets")]
    TruncatedData,
}

impl GeoError {
    /// True for errors caused by the file's contents rather than by I/O.
    ///
    /// 错误是否由文件内容（而非 I/O）引起。
    pub fn is_format_error(&self) -> bool {
        !matches!(self, GeoError::DatabaseFileReadError(_))
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;

/// Backing strategy flags passed to [`Resolver::open`].
///
/// `FILE` is the empty set: indexes parsed on demand, table and sections read
/// from the open file per query.
///
/// 传给 [`Resolver::open`] 的加载方式标志，可用 `|` 组合。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mode(u8);

impl Mode {
    /// Stream every query from the open file.
    pub const FILE: Mode = Mode(0);
    /// Preload the block table and record sections.
    pub const MEMORY: Mode = Mode(1);
    /// Materialize the byte and main indexes at load time.
    pub const BATCH: Mode = Mode(2);
    /// Map the file instead of reading it. Ignored when `MEMORY` is set.
    #[cfg(feature = "mmap")]
    pub const MMAP: Mode = Mode(4);

    /// Raw flag bits.
    ///
    /// 返回原始标志位。
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Build a mode from raw bits, dropping unknown flags.
    ///
    /// 由原始标志位构建模式，忽略未知的位。
    pub const fn from_bits_truncate(bits: u8) -> Mode {
        #[cfg(feature = "mmap")]
        const ALL: u8 = 0b111;
        #[cfg(not(feature = "mmap"))]
        const ALL: u8 = 0b011;
        Mode(bits & ALL)
    }

    /// True when every flag of `other` is set.
    ///
    /// 判断是否包含 `other` 的全部标志。
    pub const fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Mode) -> Mode {
        Mode(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mode {
    fn bitor_assign(&mut self, rhs: Mode) {
        self.0 |= rhs.0;
    }
}
