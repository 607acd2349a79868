//! Native GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Georeferencing comes from ModelPixelScale + ModelTiepoint (or
//! ModelTransformation), the CRS from the GeoKey directory, and nodata from
//! the GDAL_NODATA ASCII tag.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::crs::Crs;
use crate::error::{Error, Result};
use crate::raster::geotransform::GeoTransform;
use crate::raster::layer::RasterLayer;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
/// GeoKey value meaning "user-defined", i.e. no EPSG code.
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read the first band of a GeoTIFF file.
pub fn read_geotiff(path: &Path, name: &str) -> Result<RasterLayer> {
    let file = File::open(path)?;
    decode(BufReader::new(file), name, &path.display().to_string())
}

/// Decode a GeoTIFF from any seekable reader.
pub fn decode<R: Read + Seek>(reader: R, name: &str, origin: &str) -> Result<RasterLayer> {
    let mut decoder = Decoder::new(reader)?;
    let (w, h) = decoder.dimensions()?;
    let (width, height) = (w as usize, h as usize);

    let transform = read_transform(&mut decoder)?.ok_or_else(|| Error::MissingGeoTransform {
        path: origin.to_string(),
    })?;
    let crs = read_crs(&mut decoder)?.ok_or_else(|| Error::MissingCrs {
        path: origin.to_string(),
    })?;
    let nodata = read_nodata(&mut decoder)?;

    let mut data = widen(decoder.read_image()?)?;
    let cells = width * height;
    if cells == 0 || data.len() < cells || data.len() % cells != 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    // Pixel-interleaved multi-sample images: keep the first band.
    let samples = data.len() / cells;
    if samples > 1 {
        data = data.into_iter().step_by(samples).collect();
    }

    RasterLayer::new(name, data, width, height, transform, crs, nodata)
}

fn widen(result: DecodingResult) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => return Err(Error::UnsupportedDataType("64-bit integer TIFF samples".into())),
    })
}

fn optional_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16) -> Result<Option<Vec<f64>>> {
    if decoder.find_tag(tag(code))?.is_none() {
        return Ok(None);
    }
    Ok(Some(decoder.get_tag_f64_vec(tag(code))?))
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<GeoTransform>> {
    if let Some(matrix) = optional_f64s(decoder, MODEL_TRANSFORMATION)? {
        return Ok(GeoTransform::from_model_transformation(&matrix));
    }
    let scale = optional_f64s(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = optional_f64s(decoder, MODEL_TIEPOINT)?;
    Ok(match (tiepoint, scale) {
        (Some(t), Some(s)) => GeoTransform::from_tiepoint(&t, &s),
        _ => None,
    })
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Crs>> {
    if decoder.find_tag(tag(GEO_KEY_DIRECTORY))?.is_none() {
        return Ok(None);
    }
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY))?;
    Ok(crs_from_geokeys(&keys))
}

/// Pick the EPSG code out of a GeoKey directory. Projected codes win over
/// geographic ones; only values stored inline (location 0) are considered.
pub(crate) fn crs_from_geokeys(keys: &[u16]) -> Option<Crs> {
    if keys.len() < 4 {
        return None;
    }
    let n = keys[3] as usize;
    let mut projected = None;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(n) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value),
            _ => {}
        }
    }
    projected.or(geographic).map(|code| Crs::from_epsg(u32::from(code)))
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    if decoder.find_tag(tag(GDAL_NODATA))?.is_none() {
        return Ok(None);
    }
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA))?;
    Ok(parse_nodata(&text))
}

fn parse_nodata(text: &str) -> Option<f64> {
    let t = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    match t.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        _ => t.parse().ok(),
    }
}

/// Write a single-band Float32 GeoTIFF. `values` is row-major, row 0 = top.
pub fn write_geotiff(
    path: &Path,
    values: &[f64],
    width: usize,
    height: usize,
    transform: &GeoTransform,
    crs: Crs,
    nodata: Option<f64>,
) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode(&mut writer, values, width, height, transform, crs, nodata)?;
    writer.flush()?;
    Ok(())
}

/// Encode a single-band Float32 GeoTIFF into any seekable writer.
pub fn encode<W: Write + Seek>(
    writer: W,
    values: &[f64],
    width: usize,
    height: usize,
    transform: &GeoTransform,
    crs: Crs,
    nodata: Option<f64>,
) -> Result<()> {
    if width == 0 || height == 0 || values.len() != width * height {
        return Err(Error::InvalidDimensions { width, height });
    }
    let epsg = u16::try_from(crs.epsg()).map_err(|_| Error::UnsupportedCrs(crs.epsg()))?;
    let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;

    if transform.row_rotation == 0.0 && transform.col_rotation == 0.0 {
        let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
        image.encoder().write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
        image.encoder().write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let t = transform;
        let matrix = [
            t.pixel_width, t.row_rotation, 0.0, t.origin_x,
            t.col_rotation, t.pixel_height, 0.0, t.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image.encoder().write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    let (model_type, crs_key) = if crs.is_geographic() {
        (2, GEOGRAPHIC_TYPE_KEY)
    } else {
        (1, PROJECTED_CS_TYPE_KEY)
    };
    let geokeys: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE_KEY, 0, 1, model_type,
        GT_RASTER_TYPE_KEY, 0, 1, 1,
        crs_key, 0, 1, epsg,
    ];
    image.encoder().write_tag(tag(GEO_KEY_DIRECTORY), &geokeys[..])?;

    if let Some(nd) = nodata {
        let text = format!("{nd}");
        image.encoder().write_tag(tag(GDAL_NODATA), text.as_str())?;
    }

    image.write_data(&data)?;
    Ok(())
}
