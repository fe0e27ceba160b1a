use std::{
    fmt::Debug,
    fs::File,
    io::{Cursor, Read, Seek, SeekFrom},
    net::Ipv4Addr,
    path::Path,
};

use tracing::{debug, trace};

use crate::{
    Mode, Result,
    blocks::find_seek,
    common::{Header, Preamble, read_preamble},
    country::iso_code,
    disk::StreamBody,
    index::{BatchIndex, IndexSource, PackedIndex, narrow},
    memory::MemoryBody,
    record::{Record, Schema, Value},
    store::{BodySource, DataStore, RecordKind},
};

/// Country identity attached to a short city lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryRef {
    pub id: u32,
    pub iso: String,
}

impl CountryRef {
    fn from_id(id: u32) -> Self {
        Self {
            id,
            iso: iso_code(id).to_string(),
        }
    }

    fn from_record(record: &Record) -> Self {
        Self {
            id: record
                .get_i64("id")
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or(0),
            iso: record.get_str("iso").unwrap_or_default().to_string(),
        }
    }
}

/// City record plus the id and ISO code of its country.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub city: Record,
    pub country: CountryRef,
}

/// City, region and country records with their back-references removed.
#[derive(Debug, Clone, PartialEq)]
pub struct CityFull {
    pub city: Record,
    pub region: Record,
    pub country: Record,
}

/// Result of [`Resolver::lookup`], shaped by the database edition.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    City(Option<City>),
    Country(String),
}

/// Where the country of a decoded city comes from.
enum CountrySource {
    /// The seek pointer addressed a country record at the head of the city section.
    Embedded(Record),
    /// A full city record carrying a country ordinal.
    ById(u32),
}

/// Read-only lookup engine over one database.
///
/// Indexes and, depending on [`Mode`], the block table and record sections are
/// loaded once at construction; every lookup takes `&self`.
///
/// 单个数据库上的只读查询器，构建后可在多线程间共享。
#[derive(Debug)]
pub struct Resolver {
    header: Header,
    schemas: Option<[Schema; 3]>,
    store: DataStore,
    mode: Mode,
}

impl Resolver {
    /// Open a database file.
    ///
    /// 打开数据库文件。
    ///
    /// # Arguments
    /// - `path`: The path to the database file.
    /// - `mode`: Backing strategy flags, e.g. `Mode::MEMORY | Mode::BATCH`.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        #[cfg(feature = "mmap")]
        {
            if mode.contains(Mode::MMAP) && !mode.contains(Mode::MEMORY) {
                return Self::open_mmap(file, mode);
            }
        }
        Self::from_reader(file, mode)
    }

    #[cfg(feature = "mmap")]
    fn open_mmap(mut file: File, mode: Mode) -> Result<Self> {
        let preamble = read_preamble(&mut file)?;
        let body = crate::mmap::MmapBody::map(&file, &preamble.geometry)?;
        Ok(Self::assemble(preamble, Box::new(body), mode))
    }

    /// Build a resolver over any seekable source holding a complete database.
    ///
    /// Without [`Mode::MEMORY`] the reader is kept and queried on every lookup.
    ///
    /// 从任意可定位的数据源构建查询器。
    pub fn from_reader<R>(mut reader: R, mode: Mode) -> Result<Self>
    where
        R: Read + Seek + Send + Debug + 'static,
    {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let preamble = read_preamble(&mut reader)?;
        preamble.geometry.check_file_len(file_len)?;

        let body: Box<dyn BodySource> = if mode.contains(Mode::MEMORY) {
            Box::new(MemoryBody::load(&mut reader, &preamble.geometry)?)
        } else {
            Box::new(StreamBody::new(reader, preamble.geometry.blocks_begin))
        };
        Ok(Self::assemble(preamble, body, mode))
    }

    /// Build a resolver from the bytes of a database file.
    ///
    /// The bytes are already in memory, so [`Mode::MEMORY`] is implied.
    ///
    /// 从原始字节构建查询器。
    pub fn from_bytes(data: Vec<u8>, mode: Mode) -> Result<Self> {
        let preamble = read_preamble(&mut Cursor::new(&data))?;
        preamble.geometry.check_file_len(data.len() as u64)?;
        let body = MemoryBody::split_from(data, &preamble.geometry)?;
        Ok(Self::assemble(preamble, Box::new(body), mode | Mode::MEMORY))
    }

    fn assemble(preamble: Preamble, body: Box<dyn BodySource>, mode: Mode) -> Self {
        let Preamble {
            header,
            schemas,
            byte_index,
            main_index,
            geometry,
        } = preamble;
        let index: Box<dyn IndexSource> = if mode.contains(Mode::BATCH) {
            Box::new(BatchIndex::new(&byte_index, &main_index))
        } else {
            Box::new(PackedIndex::new(byte_index, main_index))
        };
        debug!(
            ?mode,
            version = header.version,
            blocks = header.block_count,
            byte_index = header.byte_index_len,
            main_index = header.main_index_len,
            range = header.range,
            cities = header.has_cities(),
            "opened geo database"
        );
        let store = DataStore::new(index, body, geometry, header.block_width());
        Self {
            header,
            schemas,
            store,
            mode,
        }
    }

    /// Parsed file header.
    ///
    /// 返回解析后的文件头。
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Backing strategy this resolver was built with.
    ///
    /// 返回构建时使用的加载模式。
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Release the database. Equivalent to dropping the resolver.
    ///
    /// 释放数据库，等同于 drop。
    pub fn close(self) {}

    /// Seek pointer for a dotted-quad address; 0 when unresolved or malformed.
    ///
    /// 查询点分十进制地址的偏移指针，未找到或格式错误时返回 0。
    pub fn resolve(&self, ip: &str) -> Result<u32> {
        match ip.parse::<Ipv4Addr>() {
            Ok(addr) => self.resolve_addr(addr),
            Err(_) => Ok(0),
        }
    }

    /// Seek pointer for an address; 0 when unresolved.
    ///
    /// For country editions this is the country ordinal, otherwise an offset
    /// into the city section.
    ///
    /// 查询地址的偏移指针，未找到时返回 0。
    pub fn resolve_addr(&self, ip: Ipv4Addr) -> Result<u32> {
        let Some(window) = narrow(&self.store, &self.header, ip) else {
            return Ok(0);
        };
        if window.is_empty() {
            return Ok(0);
        }
        let blocks = self.store.blocks(window)?;
        let [_, b, c, d] = ip.octets();
        let seek = find_seek(&blocks, [b, c, d], self.header.block_width());
        trace!(%ip, seek, "resolved seek pointer");
        Ok(seek)
    }

    /// ISO code of the country for `ip`, or `""` when unresolved.
    ///
    /// 查询国家 ISO 代码，未找到时返回空字符串。
    pub fn country(&self, ip: &str) -> Result<String> {
        Ok(self.country_ref(ip)?.iso)
    }

    /// Country ordinal for `ip`, or 0 when unresolved.
    ///
    /// 查询国家编号，未找到时返回 0。
    pub fn country_id(&self, ip: &str) -> Result<u32> {
        Ok(self.country_ref(ip)?.id)
    }

    /// City record and country identity for `ip`.
    ///
    /// 查询城市记录及其所属国家。
    pub fn city(&self, ip: &str) -> Result<Option<City>> {
        let seek = self.resolve(ip)?;
        if seek == 0 {
            return Ok(None);
        }
        self.parse_city(seek)
    }

    /// City, region and country records for `ip`.
    ///
    /// 查询城市、地区与国家的完整记录。
    pub fn city_full(&self, ip: &str) -> Result<Option<CityFull>> {
        let seek = self.resolve(ip)?;
        if seek == 0 {
            return Ok(None);
        }
        self.parse_city_full(seek)
    }

    /// City lookup for city editions, country lookup otherwise.
    ///
    /// 城市版查询城市，国家版查询国家代码。
    pub fn lookup(&self, ip: &str) -> Result<Lookup> {
        if self.header.has_cities() {
            Ok(Lookup::City(self.city(ip)?))
        } else {
            Ok(Lookup::Country(self.country(ip)?))
        }
    }

    fn country_ref(&self, ip: &str) -> Result<CountryRef> {
        let seek = self.resolve(ip)?;
        if !self.header.has_cities() {
            return Ok(CountryRef::from_id(seek));
        }
        if seek == 0 {
            return Ok(CountryRef::default());
        }
        Ok(self
            .parse_city(seek)?
            .map(|city| city.country)
            .unwrap_or_default())
    }

    fn read_record(&self, schemas: &[Schema; 3], kind: RecordKind, seek: usize) -> Result<Record> {
        let raw = self
            .store
            .section(kind.section(), seek, self.header.max_record_len(kind))?;
        schemas[kind as usize].decode(&raw)
    }

    fn city_parts(&self, schemas: &[Schema; 3], seek: u32) -> Result<(Record, CountrySource)> {
        if seek < self.header.country_section_size {
            let country = self.read_record(schemas, RecordKind::Country, seek as usize)?;
            let mut city = schemas[RecordKind::City as usize].defaults();
            for coord in ["lat", "lon"] {
                if let Some(value) = country.get(coord) {
                    city.set(coord, value.clone());
                }
            }
            return Ok((city, CountrySource::Embedded(country)));
        }

        let mut city = self.read_record(schemas, RecordKind::City, seek as usize)?;
        let id = city
            .remove("country_id")
            .and_then(|v| v.as_i64())
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(0);
        Ok((city, CountrySource::ById(id)))
    }

    fn parse_city(&self, seek: u32) -> Result<Option<City>> {
        let Some(schemas) = &self.schemas else {
            return Ok(None);
        };
        let (mut city, source) = self.city_parts(schemas, seek)?;
        city.remove("region_seek");
        let country = match source {
            CountrySource::Embedded(record) => CountryRef::from_record(&record),
            CountrySource::ById(id) => CountryRef::from_id(id),
        };
        Ok(Some(City { city, country }))
    }

    fn parse_city_full(&self, seek: u32) -> Result<Option<CityFull>> {
        let Some(schemas) = &self.schemas else {
            return Ok(None);
        };
        let (mut city, source) = self.city_parts(schemas, seek)?;
        let region_seek = offset_field(city.remove("region_seek"));
        let mut region = self.read_record(schemas, RecordKind::Region, region_seek)?;
        let country_seek = offset_field(region.remove("country_seek"));
        let country = match source {
            CountrySource::Embedded(record) => record,
            CountrySource::ById(_) => self.read_record(schemas, RecordKind::Country, country_seek)?,
        };
        Ok(Some(CityFull {
            city,
            region,
            country,
        }))
    }
}

/// Back-reference field as a section offset; missing or negative means "none".
fn offset_field(value: Option<Value>) -> usize {
    value
        .and_then(|v| v.as_i64())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0)
}
