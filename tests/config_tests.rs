use pan_zoom_frame::config::Configuration;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
photo-library-path: "/photos"
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.photo_library_path, Some(PathBuf::from("/photos")));
    assert_eq!(cfg.geometry.tile_size, [256, 256]);
    assert_eq!(cfg.geometry.texture_size, [1024, 1024]);
    assert_eq!(cfg.timing.slide_duration, Duration::from_secs(10));
    assert_eq!(cfg.presenter.upload_retry_limit, 2);
    cfg.validated().unwrap();
}

#[test]
fn parse_with_startup_shuffle_seed() {
    let yaml = r#"
photo-library-path: "/p"
startup-shuffle-seed: 7
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.startup_shuffle_seed, Some(7));
}

#[test]
fn parse_humantime_durations() {
    let yaml = r#"
slideshow-file: "/photos/show.txt"
timing:
  slide-duration: 6s
  fade-in: 500ms
  fade-out: 1s
  overlap: 1500ms
  speed: 0.5
producer:
  retry-delay: 250ms
"#;
    let cfg = serde_yaml::from_str::<Configuration>(yaml)
        .unwrap()
        .validated()
        .unwrap();
    let timing = cfg.timing.timing();
    assert_eq!(timing.slide_duration, Duration::from_secs(6));
    assert_eq!(timing.fade_in, Duration::from_millis(500));
    assert_eq!(timing.overlap, Duration::from_millis(1500));
    assert_eq!(cfg.timing.speed, 0.5);
    assert_eq!(cfg.producer.retry_delay, Duration::from_millis(250));
    assert_eq!(cfg.producer.idle_delay, Duration::from_millis(250));
}

#[test]
fn geometry_derives_tile_grid() {
    let yaml = r#"
photo-library-path: "/p"
geometry:
  tile-size: [128, 256]
  texture-size: [1024, 512]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let g = cfg.geometry.tile_geometry().unwrap();
    assert_eq!((g.tiles_x, g.tiles_y), (8, 2));
}

#[test]
fn rejects_unknown_fields() {
    let yaml = r#"
photo-library-path: "/p"
oversample: 2.0
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn requires_exactly_one_catalog_source() {
    let neither: Configuration = serde_yaml::from_str("{}").unwrap();
    assert!(neither.validated().is_err());

    let both: Configuration = serde_yaml::from_str(
        r#"
photo-library-path: "/p"
slideshow-file: "/p/show.txt"
"#,
    )
    .unwrap();
    assert!(both.validated().is_err());
}

#[test]
fn rejects_texture_not_divisible_by_tile() {
    let yaml = r#"
photo-library-path: "/p"
geometry:
  tile-size: [300, 256]
  texture-size: [1024, 1024]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("multiple of tile width"), "{err}");
}

#[test]
fn rejects_fades_longer_than_slide() {
    let yaml = r#"
photo-library-path: "/p"
timing:
  slide-duration: 2s
  fade-in: 1500ms
  fade-out: 1500ms
  overlap: 1s
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn loads_from_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "photo-library-path: /photos\npresenter:\n  upload-retry-limit: 0\n",
    )
    .unwrap();
    let cfg = Configuration::from_yaml_file(&path)
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.presenter.upload_retry_limit, 0);
}
