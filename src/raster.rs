//! Single-band GeoTIFF reading and writing.
//!
//! Samples are held as `f64` together with the file's sample type so that a
//! raster can be cropped or mosaicked and written back in its original
//! encoding. Georeferencing is limited to north-up grids; the GeoKey
//! directory (the CRS) is copied through untouched.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType as EncodedColorType};
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{Result, StarterKitError};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// North-up affine transform from pixel to world coordinates.
///
/// Pixel `(col, row)` has its upper-left corner at
/// `(origin_x + col * pixel_width, origin_y - row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform of the sub-grid starting at `(col, row)`.
    pub fn offset(&self, col: usize, row: usize) -> GeoTransform {
        GeoTransform {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y - row as f64 * self.pixel_height,
            ..*self
        }
    }
}

/// Sample encoding of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

/// GeoKey directory and its parameter tables, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    pub directory: Option<Vec<u16>>,
    pub double_params: Option<Vec<f64>>,
    pub ascii_params: Option<String>,
}

impl GeoKeys {
    /// GeoKeys for EPSG:4326 lon/lat, used for rasters built in memory.
    pub fn wgs84() -> Self {
        GeoKeys {
            // header, GTModelType=Geographic, GTRasterType=PixelIsArea, GeographicType=4326
            directory: Some(vec![
                1, 1, 0, 3, 1024, 0, 1, 2, 1025, 0, 1, 1, 2048, 0, 1, 4326,
            ]),
            double_params: None,
            ascii_params: None,
        }
    }
}

/// A single-band raster held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub sample_type: SampleType,
    pub nodata: Option<f64>,
    pub geokeys: GeoKeys,
    /// Row-major samples, `width * height` long.
    pub data: Vec<f64>,
}

impl Raster {
    /// Build a raster from row-major samples.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        sample_type: SampleType,
        data: Vec<f64>,
    ) -> Result<Self> {
        if data.len() != width * height {
            return Err(StarterKitError::InvalidInput(format!(
                "raster data has {} samples, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            transform,
            sample_type,
            nodata: None,
            geokeys: GeoKeys::wgs84(),
            data,
        })
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn get(&self, col: usize, row: usize) -> f64 {
        self.data[row * self.width + col]
    }

    /// Value of the pixel containing world point `(x, y)`.
    ///
    /// `None` outside the raster or where the pixel holds nodata.
    pub fn sample_at(&self, x: f64, y: f64) -> Option<f64> {
        let t = &self.transform;
        let col = ((x - t.origin_x) / t.pixel_width).floor();
        let row = ((t.origin_y - y) / t.pixel_height).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }

        let value = self.get(col as usize, row as usize);
        (!self.is_nodata(value)).then_some(value)
    }

    /// World extent as `(west, south, east, north)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let t = &self.transform;
        (
            t.origin_x,
            t.origin_y - self.height as f64 * t.pixel_height,
            t.origin_x + self.width as f64 * t.pixel_width,
            t.origin_y,
        )
    }

    /// Value used for cells that carry no data.
    pub fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(0.0)
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata,
            None => false,
        }
    }

    /// Copy of the window `[col, col + width) x [row, row + height)`.
    pub fn window(&self, col: usize, row: usize, width: usize, height: usize) -> Raster {
        let mut data = Vec::with_capacity(width * height);
        for r in row..row + height {
            let start = r * self.width + col;
            data.extend_from_slice(&self.data[start..start + width]);
        }

        Raster {
            width,
            height,
            transform: self.transform.offset(col, row),
            data,
            ..self.clone_metadata()
        }
    }

    /// Same metadata with an empty sample buffer.
    fn clone_metadata(&self) -> Raster {
        Raster {
            width: 0,
            height: 0,
            transform: self.transform,
            sample_type: self.sample_type,
            nodata: self.nodata,
            geokeys: self.geokeys.clone(),
            data: Vec::new(),
        }
    }

    /// Read the first band of a GeoTIFF.
    pub fn read(path: &Path) -> Result<Raster> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(unsupported(path, format!("colour type {other:?}, expected one band")));
            }
        }

        let (width, height) = decoder.dimensions()?;
        let transform = read_transform(&mut decoder, path)?;

        let geokeys = GeoKeys {
            directory: decoder
                .find_tag(tag(GEO_KEY_DIRECTORY))?
                .map(|v| v.into_u16_vec())
                .transpose()?,
            double_params: decoder
                .find_tag(tag(GEO_DOUBLE_PARAMS))?
                .map(|v| v.into_f64_vec())
                .transpose()?,
            ascii_params: decoder
                .find_tag(tag(GEO_ASCII_PARAMS))?
                .map(|v| v.into_string())
                .transpose()?,
        };

        let nodata = decoder
            .find_tag(tag(GDAL_NODATA))?
            .map(|v| v.into_string())
            .transpose()?
            .and_then(|s| parse_nodata(&s));

        let (sample_type, data) = match decoder.read_image()? {
            DecodingResult::U8(v) => (SampleType::U8, v.into_iter().map(f64::from).collect()),
            DecodingResult::U16(v) => (SampleType::U16, v.into_iter().map(f64::from).collect()),
            DecodingResult::U32(v) => (SampleType::U32, v.into_iter().map(f64::from).collect()),
            DecodingResult::I8(v) => (SampleType::I8, v.into_iter().map(f64::from).collect()),
            DecodingResult::I16(v) => (SampleType::I16, v.into_iter().map(f64::from).collect()),
            DecodingResult::I32(v) => (SampleType::I32, v.into_iter().map(f64::from).collect()),
            DecodingResult::F32(v) => (SampleType::F32, v.into_iter().map(f64::from).collect()),
            DecodingResult::F64(v) => (SampleType::F64, v),
            _ => return Err(unsupported(path, "64-bit integer samples".to_string())),
        };

        Raster::new(width as usize, height as usize, transform, sample_type, data).map(|r| Raster {
            nodata,
            geokeys,
            ..r
        })
    }

    /// Write as an uncompressed, strip-organised GeoTIFF, replacing `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
        let (w, h) = (self.width as u32, self.height as u32);

        match self.sample_type {
            SampleType::U8 => {
                let samples: Vec<u8> = self.data.iter().map(|v| *v as u8).collect();
                write_band::<colortype::Gray8, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::U16 => {
                let samples: Vec<u16> = self.data.iter().map(|v| *v as u16).collect();
                write_band::<colortype::Gray16, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::U32 => {
                let samples: Vec<u32> = self.data.iter().map(|v| *v as u32).collect();
                write_band::<colortype::Gray32, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::I8 => {
                let samples: Vec<i8> = self.data.iter().map(|v| *v as i8).collect();
                write_band::<colortype::GrayI8, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::I16 => {
                let samples: Vec<i16> = self.data.iter().map(|v| *v as i16).collect();
                write_band::<colortype::GrayI16, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::I32 => {
                let samples: Vec<i32> = self.data.iter().map(|v| *v as i32).collect();
                write_band::<colortype::GrayI32, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::F32 => {
                let samples: Vec<f32> = self.data.iter().map(|v| *v as f32).collect();
                write_band::<colortype::Gray32Float, _>(&mut encoder, self, w, h, &samples)
            }
            SampleType::F64 => {
                write_band::<colortype::Gray64Float, _>(&mut encoder, self, w, h, &self.data)
            }
        }
    }
}

fn unsupported(path: &Path, reason: String) -> StarterKitError {
    StarterKitError::UnsupportedRaster {
        path: PathBuf::from(path),
        reason,
    }
}

fn parse_nodata(text: &str) -> Option<f64> {
    let cleaned = text.trim_matches('\0').trim();
    match cleaned.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        _ => cleaned.parse().ok(),
    }
}

fn format_nodata(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value}")
    }
}

fn read_transform<R>(decoder: &mut Decoder<R>, path: &Path) -> Result<GeoTransform>
where
    R: std::io::Read + Seek,
{
    if let Some(matrix) = decoder.find_tag(tag(MODEL_TRANSFORMATION))? {
        let m = matrix.into_f64_vec()?;
        if m.len() < 8 {
            return Err(unsupported(path, "short ModelTransformation".to_string()));
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(unsupported(path, "rotated grid".to_string()));
        }
        return Ok(GeoTransform::new(m[3], m[7], m[0], -m[5]));
    }

    let scale = decoder.find_tag(tag(MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.find_tag(tag(MODEL_TIEPOINT))?;
    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => {
            let s = scale.into_f64_vec()?;
            let t = tiepoint.into_f64_vec()?;
            if s.len() < 2 || t.len() < 6 {
                return Err(unsupported(path, "short georeferencing tags".to_string()));
            }
            // tiepoint (i, j, k) -> (x, y, z)
            Ok(GeoTransform::new(
                t[3] - t[0] * s[0],
                t[4] + t[1] * s[1],
                s[0],
                s[1],
            ))
        }
        _ => Err(unsupported(path, "no georeferencing".to_string())),
    }
}

fn write_band<C, W>(
    encoder: &mut TiffEncoder<W>,
    raster: &Raster,
    width: u32,
    height: u32,
    samples: &[C::Inner],
) -> Result<()>
where
    C: EncodedColorType,
    [C::Inner]: TiffValue,
    W: Write + Seek,
{
    let mut image = encoder.new_image::<C>(width, height)?;
    write_geotags(image.encoder(), raster)?;
    image.write_data(samples)?;
    Ok(())
}

fn write_geotags<W, K>(dir: &mut DirectoryEncoder<'_, W, K>, raster: &Raster) -> Result<()>
where
    W: Write + Seek,
    K: TiffKind,
{
    let t = &raster.transform;
    let scale = [t.pixel_width, t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
    dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;

    if let Some(directory) = &raster.geokeys.directory {
        dir.write_tag(tag(GEO_KEY_DIRECTORY), &directory[..])?;
    }
    if let Some(doubles) = &raster.geokeys.double_params {
        dir.write_tag(tag(GEO_DOUBLE_PARAMS), &doubles[..])?;
    }
    if let Some(ascii) = &raster.geokeys.ascii_params {
        dir.write_tag(tag(GEO_ASCII_PARAMS), ascii.as_str())?;
    }
    if let Some(nodata) = raster.nodata {
        dir.write_tag(tag(GDAL_NODATA), format_nodata(nodata).as_str())?;
    }

    Ok(())
}
