//! End-to-end tests for the elevation pipeline.
//!
//! The network is replaced by in-process transports; tiles are synthetic
//! GeoTIFFs written with the crate's own writer, either straight into the
//! cache or served through the fake transport.

use elevatr_dem::{
    lon_lat_to_mercator, read_geotiff, resolve_tiles, source_name, write_geotiff_to, AlwaysConfirm,
    BoundingBox, ClipMode, Compression, Crs, DemError, ElevationClient, ElevationRequest,
    GeoTransform, RasterBuffer, RasterMeta, Settings, TileCoord, TileFetcher, TileResponse,
    TileTransport, DEFAULT_BASE_URL,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Two tiles at zoom 2: (1, 1) and (2, 1).
const BBOX: (f64, f64, f64, f64) = (-10.0, 10.0, 10.0, 30.0);
const ZOOM: u8 = 2;
const TILE_PX: usize = 8;

/// Synthetic tile whose samples encode the tile column and pixel row.
fn synthetic_tile(coord: &TileCoord) -> RasterBuffer {
    let bounds = coord.mercator_bounds();
    let res = bounds.width() / TILE_PX as f64;
    let meta = RasterMeta::new(
        Crs::WEB_MERCATOR,
        GeoTransform::from_origin(bounds.min_x, bounds.max_y, res, res),
        TILE_PX,
        TILE_PX,
    )
    .with_nodata(Some(-32768.0));
    let data = (0..TILE_PX * TILE_PX)
        .map(|i| (coord.x * 100) as f32 + (i / TILE_PX) as f32)
        .collect();
    RasterBuffer::new(data, meta).unwrap()
}

fn tile_bytes(coord: &TileCoord) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    write_geotiff_to(&synthetic_tile(coord), &mut out, Compression::Deflate).unwrap();
    out.into_inner()
}

fn populate_cache(cache_dir: &Path) {
    let bbox = BoundingBox::from_wgs84(BBOX).unwrap();
    for coord in &resolve_tiles(&bbox, ZOOM) {
        let path = coord.cache_path(cache_dir, source_name(DEFAULT_BASE_URL));
        std::fs::write(path, tile_bytes(coord)).unwrap();
    }
}

/// Transport that must never be reached.
#[derive(Default)]
struct OfflineTransport {
    calls: AtomicUsize,
}

impl TileTransport for OfflineTransport {
    fn get(&self, _url: &str) -> Result<TileResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("network disabled in tests".to_string())
    }
}

/// Transport serving synthetic tiles for `{base}/{z}/{x}/{y}.tif`.
#[derive(Default)]
struct SyntheticServer {
    calls: AtomicUsize,
}

impl TileTransport for SyntheticServer {
    fn get(&self, url: &str) -> Result<TileResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let parts: Vec<&str> = url.trim_end_matches(".tif").rsplit('/').take(3).collect();
        let (y, x, z) = match parts.as_slice() {
            [y, x, z] => (
                y.parse::<u32>().map_err(|e| e.to_string())?,
                x.parse::<u32>().map_err(|e| e.to_string())?,
                z.parse::<u8>().map_err(|e| e.to_string())?,
            ),
            _ => return Err(format!("HTTP 404 for {url}")),
        };
        Ok(TileResponse {
            content_type: Some("image/tiff".to_string()),
            imagery_sources: Some(format!("srtm/{x}.tif, gmted/all.tif")),
            body: tile_bytes(&TileCoord::new(z, x, y)),
        })
    }
}

fn quiet_settings() -> Settings {
    Settings {
        ask_confirmation: false,
        ..Settings::default()
    }
}

fn request(cache_dir: &Path) -> ElevationRequest {
    let mut request = ElevationRequest::new(BBOX, ZOOM);
    request.cache_dir = Some(cache_dir.to_path_buf());
    request.delete_cache = false;
    request.verbose = false;
    request
}

#[test]
fn test_cached_tiles_need_no_network() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());

    let transport = Arc::new(OfflineTransport::default());
    let mut fetcher = TileFetcher::new(dir.path(), Box::new(Arc::clone(&transport)));
    let tiles = resolve_tiles(&BoundingBox::from_wgs84(BBOX).unwrap(), ZOOM);
    let paths = fetcher.fetch_tiles(&tiles).unwrap();

    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0], dir.path().join("geotiff_2_1_1.tif"));
    assert_eq!(paths[1], dir.path().join("geotiff_2_2_1.tif"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fetcher.download_stats().cache_hits, 2);
}

#[test]
fn test_tile_clip_keeps_full_tiles() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());
    let transport = Arc::new(OfflineTransport::default());
    let client = ElevationClient::with_transport(quiet_settings(), transport.clone());

    let mut request = request(dir.path());
    request.clip = ClipMode::Tile;
    let raster = client
        .get_elevation_raster(&request, &AlwaysConfirm)
        .unwrap()
        .expect("no confirmation was needed");

    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert_eq!(raster.crs(), Crs::WEB_MERCATOR);
    assert_eq!(raster.width(), 2 * TILE_PX);
    assert_eq!(raster.height(), TILE_PX);

    let expected = TileCoord::new(2, 1, 1)
        .mercator_bounds()
        .union(&TileCoord::new(2, 2, 1).mercator_bounds());
    let bounds = raster.bounds();
    assert!((bounds.min_x - expected.min_x).abs() < 1e-6);
    assert!((bounds.max_x - expected.max_x).abs() < 1e-6);
    assert!((bounds.max_y - expected.max_y).abs() < 1e-6);
    assert!((bounds.min_y - expected.min_y).abs() < 1e-6);

    // West half from tile x=1, east half from tile x=2
    assert_eq!(raster.get(3, 0), Some(103.0));
    assert_eq!(raster.get(3, TILE_PX), Some(203.0));
    assert_eq!(raster.nodata(), Some(-32768.0));
    assert!(dir.path().join("geotiff_2_1_1.tif").exists());
}

#[test]
fn test_bbox_clip_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());
    let client = ElevationClient::with_transport(quiet_settings(), Arc::new(OfflineTransport::default()));

    let raster = client
        .get_elevation_raster(&request(dir.path()), &AlwaysConfirm)
        .unwrap()
        .unwrap();

    assert!(raster.width() <= 2 * TILE_PX && raster.height() <= TILE_PX);
    assert_eq!((raster.width(), raster.height()), (2, 3));

    let (x0, y0) = lon_lat_to_mercator(BBOX.0, BBOX.1);
    let (x1, y1) = lon_lat_to_mercator(BBOX.2, BBOX.3);
    let bbox = BoundingBox::new(x0, y0, x1, y1);
    let tiles = TileCoord::new(2, 1, 1)
        .mercator_bounds()
        .union(&TileCoord::new(2, 2, 1).mercator_bounds());
    assert!(raster.bounds().contains(&bbox, 1e-6));
    assert!(tiles.contains(&raster.bounds(), 1e-6));

    assert_eq!(raster.get(0, 0), Some(105.0));
    assert_eq!(raster.get(0, 1), Some(205.0));
    assert_eq!(raster.get(2, 1), Some(207.0));
}

#[test]
fn test_reproject_to_wgs84() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());
    let client = ElevationClient::with_transport(quiet_settings(), Arc::new(OfflineTransport::default()));

    let mut request = request(dir.path());
    request.crs = Some("EPSG:4326".to_string());
    let raster = client.get_elevation_raster(&request, &AlwaysConfirm).unwrap().unwrap();

    assert_eq!(raster.crs(), Crs::WGS84);
    let requested = BoundingBox::new(BBOX.0, BBOX.1, BBOX.2, BBOX.3);
    assert!(raster.bounds().contains(&requested, 1e-6));
    assert_eq!(raster.resolution().0, raster.resolution().1);

    let stats = raster.statistics().unwrap();
    assert!(stats.min >= 105.0 && stats.max <= 207.0, "{stats:?}");
}

#[test]
fn test_delete_cache_after_success() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    populate_cache(&cache);
    let client = ElevationClient::with_transport(quiet_settings(), Arc::new(OfflineTransport::default()));

    let mut request = request(&cache);
    request.delete_cache = true;
    let raster = client.get_elevation_raster(&request, &AlwaysConfirm).unwrap();
    assert!(raster.is_some());
    assert!(!cache.exists());
}

#[test]
fn test_use_cache_false_goes_to_network() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());
    let transport = Arc::new(OfflineTransport::default());
    let client = ElevationClient::with_transport(quiet_settings(), transport.clone());

    let mut request = request(dir.path());
    request.use_cache = false;
    let err = client.get_elevation_raster(&request, &AlwaysConfirm).unwrap_err();

    match err {
        DemError::DownloadFailed { url, reason } => {
            assert_eq!(url, format!("{DEFAULT_BASE_URL}/2/1/1.tif"));
            assert_eq!(reason, "network disabled in tests");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_downloaded_tiles_carry_imagery_sources() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(SyntheticServer::default());
    let client = ElevationClient::with_transport(quiet_settings(), server.clone());

    let mut request = request(dir.path());
    request.clip = ClipMode::Tile;
    let raster = client.get_elevation_raster(&request, &AlwaysConfirm).unwrap().unwrap();

    assert_eq!(server.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        raster.meta().tags().get("imagery_sources").map(String::as_str),
        Some("gmted/all.tif,srtm/1.tif,srtm/2.tif")
    );
    assert_eq!(raster.get(0, 0), Some(100.0));

    let cached = read_geotiff(dir.path().join("geotiff_2_2_1.tif")).unwrap();
    assert_eq!(cached.meta().crs(), Crs::WEB_MERCATOR);

    // Second run is served from the cache
    client.get_elevation_raster(&request, &AlwaysConfirm).unwrap().unwrap();
    assert_eq!(server.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_export_validates_compression_first() {
    let dir = tempfile::tempdir().unwrap();
    populate_cache(dir.path());
    let client = ElevationClient::with_transport(quiet_settings(), Arc::new(OfflineTransport::default()));
    let raster = client
        .get_elevation_raster(&request(dir.path()), &AlwaysConfirm)
        .unwrap()
        .unwrap();

    let bad = dir.path().join("bad.tif");
    assert!(matches!(raster.to_tif(&bad, "jpeg2000"), Err(DemError::InvalidInput(_))));
    assert!(!bad.exists());

    let good = dir.path().join("out.tif");
    raster.to_tif(&good, "LZW").unwrap();
    let reread = read_geotiff(&good).unwrap();
    assert_eq!(reread.data(), raster.data());
    assert_eq!(reread.meta().transform(), raster.transform());
    assert_eq!(reread.meta().crs(), raster.crs());

    let zstd = dir.path().join("zstd.tif");
    raster.to_tif(&zstd, "zstd").unwrap();
    assert_eq!(read_geotiff(&zstd).unwrap().data(), raster.data());
}
