//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Georeferencing is carried by ModelPixelScale +
//! ModelTiepoint, the EPSG code by the GeoKeyDirectory and the nodata value
//! by the GDAL_NODATA ASCII tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Override the nodata value written to GDAL_NODATA
    pub nodata: Option<f64>,
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

/// Cast decoded samples to `T`.
///
/// Samples that do not fit `T` (NaN or out of range) become nodata: the
/// file's nodata value when it fits `T`, otherwise a value that does not
/// occur in the data. Returns the cells and the nodata to attach.
fn cast_all<S, T>(buf: Vec<S>, nodata: Option<T>) -> Result<(Vec<T>, Option<T>)>
where
    S: num_traits::NumCast,
    T: RasterElement,
{
    let cast: Vec<Option<T>> = buf.into_iter().map(num_traits::cast).collect();
    let misfits = cast.iter().filter(|v| v.is_none()).count();
    if misfits == 0 {
        return Ok((cast.into_iter().flatten().collect(), nodata));
    }

    let fill = match nodata {
        Some(nd) => nd,
        None => unused_value(&cast).ok_or_else(|| {
            Error::UnsupportedDataType(format!(
                "{} samples do not fit the cell type and no free nodata value is left",
                misfits
            ))
        })?,
    };
    debug!(misfits, nodata = ?fill, "Samples outside the cell type read as nodata");
    Ok((cast.into_iter().map(|v| v.unwrap_or(fill)).collect(), Some(fill)))
}

/// NaN for floats, otherwise the largest value up to 255 absent from `cells`
fn unused_value<T: RasterElement>(cells: &[Option<T>]) -> Option<T> {
    std::iter::once(T::default_nodata())
        .filter(|nd| nd.is_nodata(None))
        .chain((0..=u8::MAX).rev().filter_map(|v| T::from_f64(f64::from(v))))
        .find(|candidate| !cells.iter().flatten().any(|v| v == candidate))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let nodata = read_nodata::<T, _>(&mut decoder);
    let (data, nodata) = match result {
        DecodingResult::F32(buf) => cast_all(buf, nodata)?,
        DecodingResult::F64(buf) => cast_all(buf, nodata)?,
        DecodingResult::U8(buf) => cast_all(buf, nodata)?,
        DecodingResult::U16(buf) => cast_all(buf, nodata)?,
        DecodingResult::U32(buf) => cast_all(buf, nodata)?,
        DecodingResult::I8(buf) => cast_all(buf, nodata)?,
        DecodingResult::I16(buf) => cast_all(buf, nodata)?,
        DecodingResult::I32(buf) => cast_all(buf, nodata)?,
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(nodata);

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Other("Cannot determine geotransform".into()))
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;

    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // Only inline SHORT values (location 0) carry EPSG codes
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            PROJECTED_CS_TYPE if entry[3] != 32767 => return Some(CRS::from_epsg(entry[3] as u32)),
            GEOGRAPHIC_TYPE if entry[3] != 32767 => geographic = Some(CRS::from_epsg(entry[3] as u32)),
            _ => {}
        }
    }
    geographic
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    T::from_f64(value)
}

/// Write a Raster to a GeoTIFF file
///
/// Cells are stored as 32-bit float.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file, options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    match crs.and_then(CRS::epsg) {
        Some(4326) => vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE, 0, 1, 2, // ModelTypeGeographic
            GT_RASTER_TYPE, 0, 1, 1, // RasterPixelIsArea
            GEOGRAPHIC_TYPE, 0, 1, 4326,
        ],
        Some(code) if code <= u16::MAX as u32 => vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE, 0, 1, 1, // ModelTypeProjected
            GT_RASTER_TYPE, 0, 1, 1,
            PROJECTED_CS_TYPE, 0, 1, code as u16,
        ],
        _ => vec![
            1, 1, 0, 2,
            GT_MODEL_TYPE, 0, 1, 1,
            GT_RASTER_TYPE, 0, 1, 1,
        ],
    }
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let geokeys = geokeys_for(raster.crs());
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    let nodata = options
        .nodata
        .or_else(|| raster.nodata().and_then(RasterElement::to_f64));
    if let Some(nd) = nodata {
        let text = nd.to_string();
        image
            .encoder()
            .write_tag(Tag::GdalNodata, text.as_str())
            .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}
