//! End-to-end trigger scenarios against the in-memory lidar

use halo_steer_core::geometry::EARTH_RADIUS_M;
use halo_steer_core::protocol::halo::csm::{CsmHeader, ScanPoint};
use halo_steer_core::transport::memory::MemoryConnector;
use halo_steer_core::transport::{Connector, Credentials, RemoteDelivery, RemotePaths, RemoteSession, SessionSource};
use halo_steer_core::{
    build_scan_file, resolve_trigger, run_trigger, trigger_ppi, trigger_rhi, DetectionMask,
    GridAxes, InstrumentLocation, ScanPlan, ScanRequest, SteerError, TriggerConfig,
};

const SIZE: usize = 21;
const CENTER_LAT: f64 = 41.7;
const CENTER_LON: f64 = -88.0;

/// 21x21 grid with roughly 1 km spacing on both axes, row 0 northernmost
fn km_grid() -> GridAxes {
    let lat_step = (1000.0 / EARTH_RADIUS_M).to_degrees();
    let lon_step = lat_step / CENTER_LAT.to_radians().cos();
    let latitudes = (0..SIZE)
        .map(|i| CENTER_LAT + (10.0 - i as f64) * lat_step)
        .collect();
    let longitudes = (0..SIZE)
        .map(|j| CENTER_LON + (j as f64 - 10.0) * lon_step)
        .collect();
    GridAxes::new(latitudes, longitudes)
}

/// 5x5 block at rows 0..5, columns 8..13 plus a speckle pixel near the bottom
fn boundary_mask() -> DetectionMask {
    let mut mask = DetectionMask::zeros(SIZE, SIZE);
    for r in 0..5 {
        for c in 8..13 {
            mask.set(r, c, true);
        }
    }
    mask.set(18, 10, true);
    mask
}

fn instrument_at(axes: &GridAxes, row: usize, col: usize) -> InstrumentLocation {
    InstrumentLocation::new(axes.latitudes()[row], axes.longitudes()[col])
}

fn credentials() -> Credentials {
    Credentials::new("192.168.1.20", "halo", "password")
}

#[test]
fn test_scenario_a_rhi_header_and_points() {
    let mut request = ScanRequest::new(vec![0.0, 90.0], vec![90.0]);
    request.motion.elevation_speed = 2.0;
    let file = build_scan_file(&request).unwrap();
    let text = file.to_string();

    assert!(text.starts_with("7\r\n2\r\n20\r\n"));
    assert_eq!(
        file.header(),
        Some(CsmHeader {
            repeat_count: 7,
            point_count: 2,
            rays_per_point: 20
        })
    );
    let body: Vec<&str> = text["7\r\n2\r\n20\r\n".len()..].split_terminator("\r\n").collect();
    assert_eq!(body.len(), 4);
    assert!(ScanPoint::parse(body[0]).is_some());
    assert_eq!(body[1], "W0");
    assert!(ScanPoint::parse(body[2]).is_some());
    assert_eq!(body[3], "W0");
}

#[test]
fn test_scenario_b_instrument_inside_region_triggers_rhi() {
    let axes = km_grid();
    let mask = boundary_mask();
    let lidar = instrument_at(&axes, 4, 8);
    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let creds = credentials();

    let result = resolve_trigger(&mask, &axes, lidar, 20, 5000.0).unwrap();
    assert_eq!(result.distance_m, 0.0);
    assert!(result.triggered);
    assert!((result.azimuth_degrees - 45.0).abs() < 1e-6);

    let fired = trigger_rhi(
        &mask,
        &axes,
        lidar,
        &[0.0, 45.0],
        &TriggerConfig::default(),
        &delivery,
        SessionSource::Connect(&creds),
    )
    .unwrap();

    assert!(fired);
    let stats = connector.stats();
    assert_eq!(stats.uploads, 1);
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.closes, 1);

    let uploaded = connector
        .file("/C:/Lidar/System/Scan parameters/user.txt")
        .expect("scan uploaded");
    let text = String::from_utf8(uploaded).unwrap();
    assert!(text.starts_with("7\r\n2\r\n20\r\n"));
    assert!(text.contains("P.1=-62500*")); // 45 deg azimuth
    assert!(text.contains("P.2=-31250\r\n")); // 45 deg elevation
}

#[test]
fn test_scenario_c_distant_region_does_not_trigger_ppi() {
    let axes = km_grid();
    let mask = boundary_mask();
    // Six rows south of the block's bottom edge
    let lidar = instrument_at(&axes, 10, 10);
    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let creds = credentials();

    let result = resolve_trigger(&mask, &axes, lidar, 20, 5000.0).unwrap();
    assert!((result.distance_m - 6000.0).abs() < 1e-3);
    assert!(!result.triggered);
    assert!(result.azimuth_degrees < 1e-9 || result.azimuth_degrees > 360.0 - 1e-9);

    let fired = trigger_ppi(
        &mask,
        &axes,
        lidar,
        &[0.0, 5.0, 10.0],
        &TriggerConfig::default(),
        &delivery,
        SessionSource::Connect(&creds),
    )
    .unwrap();

    assert!(!fired);
    let stats = connector.stats();
    assert_eq!(stats.uploads, 0);
    assert_eq!(stats.connects, 0);
}

#[test]
fn test_speckle_does_not_count_toward_distance() {
    let axes = km_grid();
    let mask = boundary_mask();
    // Directly on the speckle pixel, which is below the area threshold
    let lidar = instrument_at(&axes, 18, 10);
    let result = resolve_trigger(&mask, &axes, lidar, 20, 5000.0).unwrap();
    assert!((result.distance_m - 14_000.0).abs() < 1e-3);
    assert!(!result.triggered);
}

#[test]
fn test_instrument_west_of_grid_is_not_inside_region() {
    let axes = GridAxes::new(vec![42.0, 41.9, 41.8], vec![-88.1, -88.0, -87.9]);
    let mask = DetectionMask::from_rows(&[vec![1, 0, 0], vec![1, 0, 0], vec![1, 0, 0]]).unwrap();
    // Roughly 158 km west of the grid's west edge
    let lidar = InstrumentLocation::new(41.9, -90.0);

    let result = resolve_trigger(&mask, &axes, lidar, 1, 5000.0).unwrap();
    assert!(result.distance_m > 100_000.0);
    assert!(!result.triggered);
    assert!((result.azimuth_degrees - 90.0).abs() < 1e-6);

    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let creds = credentials();
    let config = TriggerConfig {
        area_threshold: 1,
        ..TriggerConfig::default()
    };
    let fired = trigger_rhi(
        &mask,
        &axes,
        lidar,
        &[0.0, 45.0],
        &config,
        &delivery,
        SessionSource::Connect(&creds),
    )
    .unwrap();
    assert!(!fired);
    assert_eq!(connector.stats().connects, 0);
}

#[test]
fn test_no_region_aborts_before_network() {
    let axes = km_grid();
    let mut mask = DetectionMask::zeros(SIZE, SIZE);
    mask.set(3, 3, true);
    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let creds = credentials();

    let err = trigger_rhi(
        &mask,
        &axes,
        instrument_at(&axes, 3, 3),
        &[0.0, 45.0],
        &TriggerConfig::default(),
        &delivery,
        SessionSource::Connect(&creds),
    )
    .unwrap_err();

    assert_eq!(err, SteerError::NoRegionFound);
    assert_eq!(connector.stats().connects, 0);
}

#[test]
fn test_invalid_scan_aborts_before_network() {
    let axes = km_grid();
    let mask = boundary_mask();
    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let creds = credentials();

    let err = trigger_rhi(
        &mask,
        &axes,
        instrument_at(&axes, 4, 8),
        &[],
        &TriggerConfig::default(),
        &delivery,
        SessionSource::Connect(&creds),
    )
    .unwrap_err();

    assert!(matches!(err, SteerError::InvalidScanRequest(_)));
    assert_eq!(connector.stats().connects, 0);
}

#[test]
fn test_shared_session_across_triggers() {
    let axes = km_grid();
    let mask = boundary_mask();
    let connector = MemoryConnector::new();
    let delivery = RemoteDelivery::new(connector.clone(), RemotePaths::default());
    let mut session = connector.connect(&credentials()).unwrap();
    let config = TriggerConfig {
        dynamic: true,
        ..TriggerConfig::default()
    };

    let plan = ScanPlan::Ppi {
        elevations: vec![0.0, 5.0],
    };
    let outcome = run_trigger(
        &mask,
        &axes,
        instrument_at(&axes, 2, 10),
        &plan,
        &config,
        &delivery,
        SessionSource::Existing(&mut session),
    )
    .unwrap();
    assert!(outcome.result.triggered);
    let scan = outcome.scan.expect("scan delivered");
    assert!(scan.is_dynamic());
    assert_eq!(scan.points().len(), 30);

    let fired = trigger_rhi(
        &mask,
        &axes,
        instrument_at(&axes, 2, 10),
        &[0.0, 30.0],
        &config,
        &delivery,
        SessionSource::Existing(&mut session),
    )
    .unwrap();
    assert!(fired);

    let stats = connector.stats();
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.uploads, 2);
    assert_eq!(stats.closes, 0);
    assert!(connector.file("/C:/Users/End User/DynScan/user.txt").is_some());

    session.close();
    assert_eq!(connector.stats().closes, 1);
}
