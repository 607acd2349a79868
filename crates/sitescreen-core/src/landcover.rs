//! CORINE Land Cover level-3 codes: names, hydrological flags and the code
//! groups the indicators key on.

use std::ops::RangeInclusive;

use crate::sample::Sample;

pub const URBAN: RangeInclusive<i64> = 111..=142;
pub const CROPLAND: RangeInclusive<i64> = 211..=244;
pub const FOREST: RangeInclusive<i64> = 311..=313;
/// Scrub, herbaceous and sparsely vegetated classes.
pub const SHRUB_GRASS: RangeInclusive<i64> = 321..=335;
/// Open spaces with little or no vegetation.
pub const BARE: RangeInclusive<i64> = 331..=335;
pub const WETLANDS: RangeInclusive<i64> = 411..=423;
pub const WATER_BODIES: RangeInclusive<i64> = 511..=523;
/// Natural and semi-natural cover used by the habitat indicators.
pub const NATURAL: RangeInclusive<i64> = 311..=399;

const CLC_NAMES: [(i64, &str); 44] = [
    (111, "Continuous urban fabric"),
    (112, "Discontinuous urban fabric"),
    (121, "Industrial or commercial units"),
    (122, "Road and rail networks and associated land"),
    (123, "Port areas"),
    (124, "Airports"),
    (131, "Mineral extraction sites"),
    (132, "Dump sites"),
    (133, "Construction sites"),
    (141, "Green urban areas"),
    (142, "Sport and leisure facilities"),
    (211, "Non-irrigated arable land"),
    (212, "Permanently irrigated land"),
    (213, "Rice fields"),
    (221, "Vineyards"),
    (222, "Fruit trees and berry plantations"),
    (223, "Olive groves"),
    (231, "Pastures"),
    (241, "Annual crops associated with permanent crops"),
    (242, "Complex cultivation patterns"),
    (243, "Land principally occupied by agriculture with significant areas of natural vegetation"),
    (244, "Agro-forestry areas"),
    (311, "Broad-leaved forest"),
    (312, "Coniferous forest"),
    (313, "Mixed forest"),
    (321, "Natural grasslands"),
    (322, "Moors and heathland"),
    (323, "Sclerophyllous vegetation"),
    (324, "Transitional woodland-shrub"),
    (331, "Beaches, dunes, sands"),
    (332, "Bare rocks"),
    (333, "Sparsely vegetated areas"),
    (334, "Burnt areas"),
    (335, "Glaciers and perpetual snow"),
    (411, "Inland marshes"),
    (412, "Peat bogs"),
    (421, "Salt marshes"),
    (422, "Salines"),
    (423, "Intertidal flats"),
    (511, "Water courses"),
    (512, "Water bodies"),
    (521, "Coastal lagoons"),
    (522, "Estuaries"),
    (523, "Sea and ocean"),
];

/// Level-3 class name, if the code is a CLC class.
pub fn name(code: i64) -> Option<&'static str> {
    CLC_NAMES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| CLC_NAMES[i].1)
}

/// Decoded land-cover attributes of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub code: Option<i64>,
    pub name: &'static str,
    pub near_water: bool,
    pub near_wetland: bool,
}

/// Integer class code of a sample; fractional values are truncated.
pub fn code_of(sample: Sample) -> Option<i64> {
    sample.value().map(|v| v.trunc() as i64)
}

/// Decode a sampled code. Missing or unknown codes decode as `"Unknown"`
/// with both flags false.
pub fn decode(sample: Sample) -> Decoded {
    let code = code_of(sample);
    match code.and_then(|c| name(c).map(|n| (c, n))) {
        Some((c, n)) => Decoded {
            code,
            name: n,
            near_water: WATER_BODIES.contains(&c),
            near_wetland: WETLANDS.contains(&c),
        },
        None => Decoded {
            code,
            name: "Unknown",
            near_water: false,
            near_wetland: false,
        },
    }
}
