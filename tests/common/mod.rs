#![allow(dead_code)]

use std::{io::Write, net::Ipv4Addr};

use sxgeo::{Mode, Resolver};

pub const COUNTRY_SCHEMA: &str = "T:id/c2:iso/n2:lat/n2:lon/b:name_en";
pub const REGION_SCHEMA: &str = "M:country_seek/b:name_en/c3:iso";
pub const CITY_SCHEMA: &str = "M:region_seek/T:country_id/M:id/N5:lat/N5:lon/b:name_en";

/// In-memory description of a database, serialized by [`Fixture::bytes`].
///
/// `blocks` holds the last address of each range with its seek pointer, sorted
/// ascending. Every leading octet present should end on `x.255.255.255`.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub db_type: u8,
    pub byte_index_len: u8,
    pub range: u16,
    pub seek_width: u8,
    pub schemas: Option<[&'static str; 3]>,
    pub blocks: Vec<(Ipv4Addr, u32)>,
    pub regions: Vec<u8>,
    pub cities: Vec<u8>,
    pub max_country_len: u16,
    pub max_region_len: u16,
    pub max_city_len: u16,
    pub country_section_size: u32,
}

impl Fixture {
    fn main_index(&self) -> Vec<Ipv4Addr> {
        let range = self.range as usize;
        let count = self.blocks.len().div_ceil(range).max(1);
        (0..count)
            .map(|g| self.blocks[((g + 1) * range - 1).min(self.blocks.len() - 1)].0)
            .collect()
    }

    /// Serialized database file.
    pub fn bytes(&self) -> Vec<u8> {
        let blob = match &self.schemas {
            Some(schemas) => schemas.join("\0").into_bytes(),
            None => Vec::new(),
        };
        let main_index = self.main_index();

        let mut out = Vec::new();
        out.extend_from_slice(b"SxG");
        out.push(22);
        out.extend_from_slice(&1_500_000_000u32.to_be_bytes());
        out.push(self.db_type);
        out.push(0);
        out.push(self.byte_index_len);
        out.extend_from_slice(&(main_index.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.range.to_be_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes());
        out.push(self.seek_width);
        out.extend_from_slice(&self.max_region_len.to_be_bytes());
        out.extend_from_slice(&self.max_city_len.to_be_bytes());
        out.extend_from_slice(&(self.regions.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.cities.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.max_country_len.to_be_bytes());
        out.extend_from_slice(&self.country_section_size.to_be_bytes());
        out.extend_from_slice(&(blob.len() as u16).to_be_bytes());
        assert_eq!(out.len(), 40);

        out.extend_from_slice(&blob);
        for octet in 0..self.byte_index_len as u32 {
            let upto = self
                .blocks
                .iter()
                .filter(|(ip, _)| ip.octets()[0] as u32 <= octet)
                .count() as u32;
            out.extend_from_slice(&upto.to_be_bytes());
        }
        for boundary in main_index {
            out.extend_from_slice(&boundary.octets());
        }
        let width = self.seek_width as usize;
        for (ip, seek) in &self.blocks {
            out.extend_from_slice(&ip.octets()[1..]);
            out.extend_from_slice(&seek.to_be_bytes()[4 - width..]);
        }
        out.extend_from_slice(&self.regions);
        out.extend_from_slice(&self.cities);
        out
    }

    /// Seek pointer of the first range of the same leading octet that ends at or after `ip`.
    pub fn expected_seek(&self, ip: Ipv4Addr) -> u32 {
        let lead = ip.octets()[0];
        if [0, 10, 127].contains(&lead) || lead >= self.byte_index_len {
            return 0;
        }
        self.blocks
            .iter()
            .filter(|(end, _)| end.octets()[0] == lead)
            .find(|(end, _)| *end >= ip)
            .map_or(0, |(_, seek)| *seek)
    }

    /// The fixture written to a named temporary file.
    pub fn write(&self) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&self.bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    /// One resolver per backing strategy, labelled for assertion messages.
    ///
    /// Opened handles outlive the temporary path.
    pub fn open_all(&self) -> Vec<(&'static str, Resolver)> {
        let file = self.write();
        #[allow(unused_mut)]
        let mut modes = vec![
            ("file", Mode::FILE),
            ("memory", Mode::MEMORY),
            ("batch", Mode::BATCH),
            ("memory|batch", Mode::MEMORY | Mode::BATCH),
        ];
        #[cfg(feature = "mmap")]
        {
            modes.push(("mmap", Mode::MMAP));
            modes.push(("mmap|batch", Mode::MMAP | Mode::BATCH));
        }
        let mut resolvers: Vec<_> = modes
            .into_iter()
            .map(|(label, mode)| (label, Resolver::open(file.path(), mode).unwrap()))
            .collect();
        resolvers.push(("bytes", Resolver::from_bytes(self.bytes(), Mode::BATCH).unwrap()));
        resolvers.push((
            "reader",
            Resolver::from_reader(std::io::Cursor::new(self.bytes()), Mode::FILE).unwrap(),
        ));
        resolvers
    }
}

pub fn ip(text: &str) -> Ipv4Addr {
    text.parse().unwrap()
}

fn u24(value: u32) -> [u8; 3] {
    let le = value.to_le_bytes();
    [le[0], le[1], le[2]]
}

fn cstr(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

pub fn country_record(id: u8, iso: &str, lat: i16, lon: i16, name: &str) -> Vec<u8> {
    let mut out = vec![id];
    out.extend_from_slice(iso.as_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out.extend_from_slice(&lon.to_le_bytes());
    cstr(&mut out, name);
    out
}

pub fn region_record(country_seek: u32, name: &str, iso: &str) -> Vec<u8> {
    let mut out = u24(country_seek).to_vec();
    cstr(&mut out, name);
    out.extend_from_slice(format!("{iso:<3}").as_bytes());
    out
}

pub fn city_record(region_seek: u32, country_id: u8, id: u32, lat: i32, lon: i32, name: &str) -> Vec<u8> {
    let mut out = u24(region_seek).to_vec();
    out.push(country_id);
    out.extend_from_slice(&u24(id));
    out.extend_from_slice(&lat.to_le_bytes());
    out.extend_from_slice(&lon.to_le_bytes());
    cstr(&mut out, name);
    out
}

/// Seek pointers into the city fixture's sections.
pub struct CitySeeks {
    pub ru: u32,
    pub de: u32,
    pub moscow: u32,
    pub munich: u32,
    pub moscow_region: u32,
    pub bavaria: u32,
}

/// Section offsets of [`city_db`].
pub fn city_seeks() -> CitySeeks {
    CitySeeks {
        ru: 1,
        de: 15,
        moscow: 30,
        munich: 52,
        moscow_region: 1,
        bavaria: 14,
    }
}

/// City edition with two embedded countries, two regions and two cities.
///
/// Octet 77 spans twenty blocks so lookups there go through the main index.
pub fn city_db() -> Fixture {
    let s = city_seeks();

    let mut cities = vec![0u8];
    cities.extend(country_record(185, "RU", 6000, 10000, "Russia"));
    cities.extend(country_record(56, "DE", 5100, 900, "Germany"));
    assert_eq!(cities.len() as u32, s.moscow);
    cities.extend(city_record(s.moscow_region, 185, 524_901, 5_575_222, 3_761_556, "Moscow"));
    assert_eq!(cities.len() as u32, s.munich);
    cities.extend(city_record(s.bavaria, 56, 2_867_714, 4_813_743, 1_157_549, "Munich"));

    let mut regions = vec![0u8];
    regions.extend(region_record(s.ru, "Moskva", "MOW"));
    assert_eq!(regions.len() as u32, s.bavaria);
    regions.extend(region_record(s.de, "Bavaria", "BY"));

    let mut blocks = vec![
        (ip("5.0.0.255"), s.moscow),
        (ip("5.1.255.255"), s.de),
        (ip("5.255.255.255"), s.munich),
    ];
    let cycle = [s.moscow, s.munich, s.de];
    for k in 0..19u8 {
        blocks.push((Ipv4Addr::new(77, k, 255, 255), cycle[k as usize % 3]));
    }
    blocks.push((ip("77.255.255.255"), s.ru));
    blocks.push((ip("200.255.255.255"), s.moscow));

    Fixture {
        db_type: 4,
        byte_index_len: 224,
        range: 4,
        seek_width: 3,
        schemas: Some([COUNTRY_SCHEMA, REGION_SCHEMA, CITY_SCHEMA]),
        blocks,
        regions,
        cities,
        max_country_len: 15,
        max_region_len: 14,
        max_city_len: 22,
        country_section_size: s.moscow,
    }
}

/// Country edition: seek pointers are country ordinals.
pub fn country_db() -> Fixture {
    Fixture {
        db_type: 1,
        byte_index_len: 32,
        range: 2,
        seek_width: 1,
        schemas: None,
        blocks: vec![
            (ip("1.0.0.255"), 0),
            (ip("1.255.255.255"), 225),
            (ip("2.255.255.255"), 74),
            (ip("5.0.255.255"), 222),
            (ip("5.255.255.255"), 185),
            (ip("8.0.255.255"), 56),
            (ip("8.8.8.255"), 225),
            (ip("8.255.255.255"), 1),
        ],
        regions: Vec::new(),
        cities: Vec::new(),
        max_country_len: 0,
        max_region_len: 0,
        max_city_len: 0,
        country_section_size: 0,
    }
}

/// Three blocks under octet 1 with seek pointers 1, 2 and 3.
pub fn minimal_db() -> Fixture {
    Fixture {
        db_type: 1,
        byte_index_len: 2,
        range: 10,
        seek_width: 1,
        schemas: None,
        blocks: vec![
            (ip("1.0.0.16"), 1),
            (ip("1.0.0.255"), 2),
            (ip("1.255.255.255"), 3),
        ],
        regions: Vec::new(),
        cities: Vec::new(),
        max_country_len: 0,
        max_region_len: 0,
        max_city_len: 0,
        country_section_size: 0,
    }
}
