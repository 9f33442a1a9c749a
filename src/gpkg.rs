//! Minimal GeoPackage (OGC 1.3) writer and geometry reader.
//!
//! A GeoPackage is an SQLite database with three metadata tables and one
//! table per feature layer. Geometries are stored as the GeoPackage binary
//! header followed by standard WKB. Only EPSG:4326 layers are written.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use geo::BoundingRect;
use geo_types::Geometry;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::country::BoundingBox;
use crate::error::{Result, StarterKitError};

/// `PRAGMA application_id` value: ASCII "GPKG".
const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;

/// `PRAGMA user_version` value for GeoPackage 1.3.
const GPKG_USER_VERSION: i32 = 10300;

const WGS84_SRS_ID: i32 = 4326;

const WGS84_DEFINITION: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

/// A vector feature: one geometry plus string attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: BTreeMap<String, String>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// An open GeoPackage file.
pub struct GeoPackage {
    pool: SqlitePool,
}

impl GeoPackage {
    /// Create a fresh GeoPackage at `path`, replacing any existing file.
    pub async fn create(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_file(path).await?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let gpkg = Self { pool };
        gpkg.initialize_schema().await?;

        Ok(gpkg)
    }

    /// Open an existing GeoPackage for reading.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create the mandatory metadata tables and the WGS 84 SRS rows.
    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(&format!("PRAGMA application_id = {GPKG_APPLICATION_ID}"))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("PRAGMA user_version = {GPKG_USER_VERSION}"))
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE gpkg_spatial_ref_sys (
                srs_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL PRIMARY KEY,
                organization TEXT NOT NULL,
                organization_coordsys_id INTEGER NOT NULL,
                definition TEXT NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE gpkg_contents (
                table_name TEXT NOT NULL PRIMARY KEY,
                data_type TEXT NOT NULL,
                identifier TEXT UNIQUE,
                description TEXT DEFAULT '',
                last_change DATETIME NOT NULL,
                min_x DOUBLE,
                min_y DOUBLE,
                max_x DOUBLE,
                max_y DOUBLE,
                srs_id INTEGER,
                CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id)
                    REFERENCES gpkg_spatial_ref_sys(srs_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE gpkg_geometry_columns (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                geometry_type_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL,
                z TINYINT NOT NULL,
                m TINYINT NOT NULL,
                CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
                CONSTRAINT fk_gc_tn FOREIGN KEY (table_name)
                    REFERENCES gpkg_contents(table_name),
                CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id)
                    REFERENCES gpkg_spatial_ref_sys(srs_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let srs_rows: [(&str, i32, &str, i32, &str, &str); 3] = [
            ("Undefined cartesian SRS", -1, "NONE", -1, "undefined", "undefined cartesian coordinate reference system"),
            ("Undefined geographic SRS", 0, "NONE", 0, "undefined", "undefined geographic coordinate reference system"),
            ("WGS 84 geodetic", WGS84_SRS_ID, "EPSG", 4326, WGS84_DEFINITION, "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"),
        ];
        for (name, srs_id, organization, org_id, definition, description) in srs_rows {
            sqlx::query(
                r#"
                INSERT INTO gpkg_spatial_ref_sys
                    (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(srs_id)
            .bind(organization)
            .bind(org_id)
            .bind(definition)
            .bind(description)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Write `features` into a new layer named `layer`.
    ///
    /// Attribute columns are the union of all property keys, stored as TEXT;
    /// features lacking a key get NULL.
    pub async fn write_layer(&self, layer: &str, features: &[Feature]) -> Result<()> {
        let columns: BTreeSet<&str> = features
            .iter()
            .flat_map(|f| f.properties.keys().map(String::as_str))
            .filter(|k| !k.eq_ignore_ascii_case("fid") && !k.eq_ignore_ascii_case("geom"))
            .collect();

        let column_defs: String = columns
            .iter()
            .map(|c| format!(", {} TEXT", quote_ident(c)))
            .collect();
        sqlx::query(&format!(
            "CREATE TABLE {} (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB{})",
            quote_ident(layer),
            column_defs
        ))
        .execute(&self.pool)
        .await?;

        let bounds = BoundingBox::of_geometries(features.iter().map(|f| &f.geometry));
        sqlx::query(
            r#"
            INSERT INTO gpkg_contents
                (table_name, data_type, identifier, last_change, min_x, min_y, max_x, max_y, srs_id)
            VALUES (?, 'features', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(layer)
        .bind(layer)
        .bind(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .bind(bounds.map(|b| b.west))
        .bind(bounds.map(|b| b.south))
        .bind(bounds.map(|b| b.east))
        .bind(bounds.map(|b| b.north))
        .bind(WGS84_SRS_ID)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO gpkg_geometry_columns
                (table_name, column_name, geometry_type_name, srs_id, z, m)
            VALUES (?, 'geom', ?, ?, 0, 0)
            "#,
        )
        .bind(layer)
        .bind(layer_geometry_type(features))
        .bind(WGS84_SRS_ID)
        .execute(&self.pool)
        .await?;

        let placeholders: String = columns.iter().map(|_| ", ?").collect();
        let column_list: String = columns
            .iter()
            .map(|c| format!(", {}", quote_ident(c)))
            .collect();
        let insert = format!(
            "INSERT INTO {} (geom{}) VALUES (?{})",
            quote_ident(layer),
            column_list,
            placeholders
        );

        let mut tx = self.pool.begin().await?;
        for feature in features {
            let blob = encode_geometry(&feature.geometry, WGS84_SRS_ID)?;
            let mut query = sqlx::query(&insert).bind(blob);
            for column in &columns {
                query = query.bind(feature.properties.get(*column).cloned());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(layer, features = features.len(), "GeoPackage layer written");

        Ok(())
    }

    /// Read every non-empty geometry from every feature layer.
    pub async fn read_geometries(&self) -> Result<Vec<Geometry<f64>>> {
        let layers = sqlx::query("SELECT table_name, column_name FROM gpkg_geometry_columns")
            .fetch_all(&self.pool)
            .await?;

        let mut geometries = Vec::new();
        for layer in layers {
            let table: String = layer.get("table_name");
            let column: String = layer.get("column_name");

            let rows = sqlx::query(&format!(
                "SELECT {} AS geom FROM {}",
                quote_ident(&column),
                quote_ident(&table)
            ))
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                let blob: Option<Vec<u8>> = row.try_get("geom")?;
                if let Some(geometry) = blob.as_deref().map(decode_geometry).transpose()?.flatten() {
                    geometries.push(geometry);
                }
            }
        }

        Ok(geometries)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Write a single-layer GeoPackage named after the file stem.
pub async fn write_features(path: &Path, features: &[Feature]) -> Result<()> {
    let layer = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("features")
        .to_string();

    let gpkg = GeoPackage::create(path).await?;
    gpkg.write_layer(&layer, features).await?;
    gpkg.close().await;

    Ok(())
}

/// Read all geometries stored in the GeoPackage at `path`.
pub async fn read_geometries(path: &Path) -> Result<Vec<Geometry<f64>>> {
    let gpkg = GeoPackage::open(path).await?;
    let geometries = gpkg.read_geometries().await?;
    gpkg.close().await;

    Ok(geometries)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::LineString(_) | Geometry::Line(_) => "LINESTRING",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
    }
}

fn layer_geometry_type(features: &[Feature]) -> &'static str {
    let mut names = features.iter().map(|f| geometry_type_name(&f.geometry));
    match names.next() {
        Some(first) if names.all(|n| n == first) => first,
        _ => "GEOMETRY",
    }
}

/// Encode a geometry as a GeoPackage blob with a little-endian XY envelope.
pub(crate) fn encode_geometry(geometry: &Geometry<f64>, srs_id: i32) -> Result<Vec<u8>> {
    let wkb = geometry.to_wkb(CoordDimensions::xy())?;
    let rect = geometry.bounding_rect();

    let mut blob = Vec::with_capacity(8 + 32 + wkb.len());
    blob.extend_from_slice(b"GP");
    blob.push(0);
    match rect {
        Some(rect) => {
            // little endian, envelope [minx, maxx, miny, maxy]
            blob.push(0b0000_0011);
            blob.extend_from_slice(&srs_id.to_le_bytes());
            for v in [rect.min().x, rect.max().x, rect.min().y, rect.max().y] {
                blob.extend_from_slice(&v.to_le_bytes());
            }
        }
        None => {
            // little endian, no envelope, empty geometry
            blob.push(0b0001_0001);
            blob.extend_from_slice(&srs_id.to_le_bytes());
        }
    }
    blob.extend_from_slice(&wkb);

    Ok(blob)
}

/// Decode a GeoPackage blob. Empty geometries decode to `None`.
pub(crate) fn decode_geometry(blob: &[u8]) -> Result<Option<Geometry<f64>>> {
    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(StarterKitError::Geometry(
            "not a GeoPackage geometry blob".to_string(),
        ));
    }

    let flags = blob[3];
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(StarterKitError::Geometry(format!(
                "invalid GeoPackage envelope indicator {other}"
            )));
        }
    };

    let header_len = 8 + envelope_len;
    if blob.len() <= header_len {
        return Err(StarterKitError::Geometry(
            "truncated GeoPackage geometry blob".to_string(),
        ));
    }

    let geometry = Wkb(blob[header_len..].to_vec()).to_geo()?;
    Ok(Some(geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Polygon, line_string, polygon};

    fn sample_polygon() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 3.0),
            (x: 0.0, y: 3.0),
            (x: 0.0, y: 0.0),
        ]
    }

    #[test]
    fn test_blob_header_layout() {
        let blob = encode_geometry(&Geometry::Polygon(sample_polygon()), 4326).unwrap();

        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[2], 0);
        assert_eq!(blob[3], 0b0000_0011);
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 4326);
        // envelope: minx, maxx, miny, maxy
        assert_eq!(f64::from_le_bytes(blob[8..16].try_into().unwrap()), 0.0);
        assert_eq!(f64::from_le_bytes(blob[16..24].try_into().unwrap()), 4.0);
        assert_eq!(f64::from_le_bytes(blob[32..40].try_into().unwrap()), 3.0);
        // WKB starts with the byte-order marker
        assert_eq!(blob[40], 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_geometry(b"XX\0\x01\0\0\0\0\0").is_err());
        assert!(decode_geometry(b"GP").is_err());
    }

    #[test]
    fn test_decode_empty_flag() {
        let blob = [b'G', b'P', 0, 0b0001_0001, 0, 0, 0, 0];
        assert!(decode_geometry(&blob).unwrap().is_none());
    }

    #[test]
    fn test_layer_geometry_type() {
        let line: LineString<f64> = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        let lines = vec![
            Feature::new(Geometry::LineString(line.clone())),
            Feature::new(Geometry::LineString(line.clone())),
        ];
        assert_eq!(layer_geometry_type(&lines), "LINESTRING");

        let mixed = vec![
            Feature::new(Geometry::LineString(line)),
            Feature::new(Geometry::Polygon(sample_polygon())),
        ];
        assert_eq!(layer_geometry_type(&mixed), "GEOMETRY");
    }

    #[tokio::test]
    async fn test_write_then_read_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("KEN_adm_0.gpkg");

        let features = vec![
            Feature::new(Geometry::Polygon(sample_polygon()))
                .with_property("GID_0", "KEN")
                .with_property("COUNTRY", "Kenya"),
        ];
        write_features(&path, &features).await.unwrap();

        let geometries = read_geometries(&path).await.unwrap();
        assert_eq!(geometries.len(), 1);
        let bounds = BoundingBox::of_geometries(&geometries).unwrap();
        assert_eq!(bounds, BoundingBox::new(0.0, 0.0, 4.0, 3.0));

        let gpkg = GeoPackage::open(&path).await.unwrap();
        let row = sqlx::query(r#"SELECT "COUNTRY" AS country FROM "KEN_adm_0""#)
            .fetch_one(&gpkg.pool)
            .await
            .unwrap();
        let country: String = row.get("country");
        assert_eq!(country, "Kenya");

        let contents = sqlx::query("SELECT data_type, srs_id FROM gpkg_contents")
            .fetch_one(&gpkg.pool)
            .await
            .unwrap();
        let data_type: String = contents.get("data_type");
        let srs_id: i32 = contents.get("srs_id");
        assert_eq!(data_type, "features");
        assert_eq!(srs_id, 4326);
        gpkg.close().await;
    }

    #[tokio::test]
    async fn test_create_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.gpkg");
        std::fs::write(&path, b"stale").unwrap();

        let line: LineString<f64> = line_string![(x: 36.8, y: -1.3), (x: 36.9, y: -1.2)];
        write_features(&path, &[Feature::new(Geometry::LineString(line))])
            .await
            .unwrap();

        let geometries = read_geometries(&path).await.unwrap();
        assert_eq!(geometries.len(), 1);
        assert!(matches!(geometries[0], Geometry::LineString(_)));
    }
}
