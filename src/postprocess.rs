//! Raster and archive post-processing on files already downloaded.
//!
//! Errors here propagate to the caller unchanged: these steps run right
//! after a successful download and a failure should be visible.

use std::fs::File;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Intersects};
use geo_types::{Geometry, GeometryCollection, MultiPolygon, Point};
use tracing::info;

use crate::country::BoundingBox;
use crate::error::{Result, StarterKitError};
use crate::gpkg;
use crate::raster::{GeoTransform, Raster};

/// Tolerance for snapping world coordinates onto the pixel grid.
const GRID_EPSILON: f64 = 1e-9;

/// Where mask shapes come from. Shapes must share the raster's CRS.
#[derive(Debug, Clone)]
pub enum GeometrySource {
    /// A vector file: GeoPackage (`.gpkg`) or GeoJSON (`.geojson`, `.json`).
    Path(PathBuf),

    /// An in-memory collection.
    Collection(GeometryCollection<f64>),

    /// A plain list of geometries.
    Geometries(Vec<Geometry<f64>>),
}

impl From<&Path> for GeometrySource {
    fn from(path: &Path) -> Self {
        GeometrySource::Path(path.to_path_buf())
    }
}

impl From<Vec<Geometry<f64>>> for GeometrySource {
    fn from(geometries: Vec<Geometry<f64>>) -> Self {
        GeometrySource::Geometries(geometries)
    }
}

impl GeometrySource {
    /// Load the geometries this source refers to.
    pub async fn load(self) -> Result<Vec<Geometry<f64>>> {
        match self {
            GeometrySource::Path(path) => read_vector_file(&path).await,
            GeometrySource::Collection(collection) => Ok(collection.0),
            GeometrySource::Geometries(geometries) => Ok(geometries),
        }
    }
}

async fn read_vector_file(path: &Path) -> Result<Vec<Geometry<f64>>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("gpkg") => gpkg::read_geometries(path).await,
        Some("geojson") | Some("json") => {
            let text = tokio::fs::read_to_string(path).await?;
            let geojson: geojson::GeoJson = text.parse()?;
            let collection: GeometryCollection<f64> = geojson::quick_collection(&geojson)?;
            Ok(collection.0)
        }
        _ => Err(StarterKitError::InvalidGeometrySource(format!(
            "{} is not a GeoPackage or GeoJSON file",
            path.display()
        ))),
    }
}

/// Collect the polygonal parts of `geometries` into one multipolygon.
fn polygons_of(geometries: Vec<Geometry<f64>>) -> MultiPolygon<f64> {
    let mut polygons = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            Geometry::Rect(r) => polygons.push(r.to_polygon()),
            Geometry::Triangle(t) => polygons.push(t.to_polygon()),
            Geometry::GeometryCollection(gc) => polygons.extend(polygons_of(gc.0).0),
            _ => {}
        }
    }
    MultiPolygon(polygons)
}

/// Clip `raster_path` to the union of the shapes and write `output_path`.
///
/// The result is cropped to the shapes' bounds, snapped outward to the pixel
/// grid. Pixels whose centre lies outside every polygon are set to the
/// raster's nodata value (0 when it has none). `output_path` may equal
/// `raster_path`.
pub async fn mask_raster_with_geometry(
    raster_path: &Path,
    shapes: GeometrySource,
    output_path: &Path,
) -> Result<()> {
    let polygons = polygons_of(shapes.load().await?);
    if polygons.0.is_empty() {
        return Err(StarterKitError::InvalidGeometrySource(
            "no polygonal geometries to mask with".to_string(),
        ));
    }

    let raster = Raster::read(raster_path)?;
    let masked = mask_raster(&raster, &polygons)
        .ok_or_else(|| StarterKitError::NoOverlap(raster_path.to_path_buf()))?;
    masked.write(output_path)?;

    info!(
        input = %raster_path.display(),
        output = %output_path.display(),
        width = masked.width,
        height = masked.height,
        "Masked raster saved"
    );

    Ok(())
}

/// Crop and mask an in-memory raster. `None` when the shapes miss it.
pub fn mask_raster(raster: &Raster, polygons: &MultiPolygon<f64>) -> Option<Raster> {
    let bounds = BoundingBox::from(polygons.bounding_rect()?);
    let t = &raster.transform;

    let col_start = ((bounds.west - t.origin_x) / t.pixel_width + GRID_EPSILON).floor();
    let col_end = ((bounds.east - t.origin_x) / t.pixel_width - GRID_EPSILON).ceil();
    let row_start = ((t.origin_y - bounds.north) / t.pixel_height + GRID_EPSILON).floor();
    let row_end = ((t.origin_y - bounds.south) / t.pixel_height - GRID_EPSILON).ceil();

    let col_start = col_start.max(0.0) as usize;
    let row_start = row_start.max(0.0) as usize;
    let col_end = col_end.min(raster.width as f64).max(0.0) as usize;
    let row_end = row_end.min(raster.height as f64).max(0.0) as usize;
    if col_start >= col_end || row_start >= row_end {
        return None;
    }

    let mut window = raster.window(col_start, row_start, col_end - col_start, row_end - row_start);
    let inside = rasterize(&window.transform, window.width, window.height, polygons);
    let fill = window.fill_value();
    for (value, keep) in window.data.iter_mut().zip(inside) {
        if !keep {
            *value = fill;
        }
    }

    Some(window)
}

/// `true` for pixels whose centre lies inside or on the edge of a polygon.
fn rasterize(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    polygons: &MultiPolygon<f64>,
) -> Vec<bool> {
    let mut inside = Vec::with_capacity(width * height);
    for row in 0..height {
        let y = transform.origin_y - (row as f64 + 0.5) * transform.pixel_height;
        for col in 0..width {
            let x = transform.origin_x + (col as f64 + 0.5) * transform.pixel_width;
            inside.push(polygons.intersects(&Point::new(x, y)));
        }
    }
    inside
}

/// Mosaic `raster_paths` into one raster written to `output_path`.
///
/// The output covers the union of the inputs at the first input's
/// resolution. Where inputs overlap, the earliest one with data wins.
pub fn merge_rasters(raster_paths: &[PathBuf], output_path: &Path) -> Result<()> {
    if raster_paths.is_empty() {
        return Err(StarterKitError::InvalidInput(
            "merge needs at least one raster".to_string(),
        ));
    }

    let sources = raster_paths
        .iter()
        .map(|p| Raster::read(p))
        .collect::<Result<Vec<_>>>()?;
    let mosaic = merge(&sources)?;
    drop(sources);

    mosaic.write(output_path)?;

    info!(
        inputs = raster_paths.len(),
        output = %output_path.display(),
        width = mosaic.width,
        height = mosaic.height,
        "Merged rasters saved"
    );

    Ok(())
}

/// In-memory mosaic with the "first" method.
pub fn merge(sources: &[Raster]) -> Result<Raster> {
    let first = sources
        .first()
        .ok_or_else(|| StarterKitError::InvalidInput("merge needs at least one raster".to_string()))?;
    let (res_x, res_y) = (first.transform.pixel_width, first.transform.pixel_height);

    let (mut west, mut south, mut east, mut north) = first.bounds();
    for source in &sources[1..] {
        let (w, s, e, n) = source.bounds();
        west = west.min(w);
        south = south.min(s);
        east = east.max(e);
        north = north.max(n);
    }

    let width = ((east - west) / res_x).round() as usize;
    let height = ((north - south) / res_y).round() as usize;
    let fill = first.fill_value();

    // nearest neighbour: each output cell centre is looked up in every
    // source through that source's own transform
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        let y = north - (row as f64 + 0.5) * res_y;
        for col in 0..width {
            let x = west + (col as f64 + 0.5) * res_x;
            let value = sources
                .iter()
                .filter_map(|source| source.sample_at(x, y))
                .next()
                .unwrap_or(fill);
            data.push(value);
        }
    }

    let transform = GeoTransform::new(west, north, res_x, res_y);
    let mut mosaic = Raster::new(width, height, transform, first.sample_type, data)?;
    mosaic.nodata = first.nodata;
    mosaic.geokeys = first.geokeys.clone();

    Ok(mosaic)
}

/// Extract every entry of `zip_path` into `extract_to`, keeping the
/// archive's directory structure. Returns the number of entries.
pub fn unzip_file(zip_path: &Path, extract_to: &Path) -> Result<usize> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    std::fs::create_dir_all(extract_to)?;
    let entries = archive.len();
    archive.extract(extract_to)?;

    info!(
        archive = %zip_path.display(),
        destination = %extract_to.display(),
        entries,
        "Archive extracted"
    );

    Ok(entries)
}
