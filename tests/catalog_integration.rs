use pan_zoom_frame::error::Error;
use pan_zoom_frame::events::CatalogCommand;
use pan_zoom_frame::tasks::catalog::{Catalog, Direction, PhotoCatalog};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

fn library(root: &Path) -> PathBuf {
    let lib = root.join("lib");
    fs::create_dir_all(lib.join("2003").join("Hawaii_trip")).unwrap();
    fs::create_dir_all(lib.join(".thumbnails")).unwrap();
    for name in ["a.jpg", "b.JPEG", "c.png", "d.webp", "notes.txt", ".hidden.jpg"] {
        fs::write(lib.join(name), b"x").unwrap();
    }
    fs::write(lib.join("2003").join("Hawaii_trip").join("beach_day.jpg"), b"x").unwrap();
    fs::write(lib.join(".thumbnails").join("a.jpg"), b"x").unwrap();
    lib
}

fn drain(catalog: &mut PhotoCatalog) -> Vec<PathBuf> {
    (0..catalog.len())
        .map(|_| catalog.next_entry().unwrap().path)
        .collect()
}

#[test]
fn scan_skips_hidden_and_non_images() {
    let tmp = tempdir().unwrap();
    let lib = library(tmp.path());
    let mut catalog = PhotoCatalog::from_directory(&lib, Some(1)).unwrap();
    assert_eq!(catalog.len(), 5);

    let mut names: Vec<String> = drain(&mut catalog)
        .into_iter()
        .map(|p| p.strip_prefix(&lib).unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "2003/Hawaii_trip/beach_day.jpg",
            "a.jpg",
            "b.JPEG",
            "c.png",
            "d.webp",
        ]
    );
}

#[test]
fn fixed_seed_gives_fixed_order() {
    let tmp = tempdir().unwrap();
    let lib = library(tmp.path());
    let first = drain(&mut PhotoCatalog::from_directory(&lib, Some(42)).unwrap());
    let second = drain(&mut PhotoCatalog::from_directory(&lib, Some(42)).unwrap());
    assert_eq!(first, second);
}

#[test]
fn order_wraps_and_reverses() {
    let tmp = tempdir().unwrap();
    let lib = library(tmp.path());
    let mut catalog = PhotoCatalog::from_directory(&lib, Some(7)).unwrap();
    let order = drain(&mut catalog);
    assert_eq!(catalog.next_entry().unwrap().path, order[0]);

    catalog.apply(CatalogCommand::SetDirection(Direction::Backward));
    assert_eq!(catalog.direction(), Direction::Backward);
    assert_eq!(catalog.next_entry().unwrap().path, order[1]);
    assert_eq!(catalog.next_entry().unwrap().path, order[0]);
    assert_eq!(catalog.next_entry().unwrap().path, order[4]);
}

#[test]
fn captions_come_from_the_library_path() {
    let tmp = tempdir().unwrap();
    let lib = library(tmp.path());
    let mut catalog = PhotoCatalog::from_directory(&lib, Some(3)).unwrap();
    let caption = (0..catalog.len())
        .filter_map(|_| catalog.next_entry())
        .find(|e| e.path.ends_with("beach_day.jpg"))
        .unwrap()
        .display_name;
    assert_eq!(caption, "2003, Hawaii trip, beach day");
}

#[test]
fn slideshow_file_resolves_relative_entries() {
    let tmp = tempdir().unwrap();
    let show = tmp.path().join("show");
    fs::create_dir_all(&show).unwrap();
    let file = show.join("list.txt");
    fs::write(
        &file,
        "# holiday\nfirst.jpg 5\n\n/abs/second.png\nthird.jpg 0 # default time\n",
    )
    .unwrap();

    let mut catalog = PhotoCatalog::from_slideshow_file(&file).unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.root(), show.as_path());

    let first = catalog.next_entry().unwrap();
    assert_eq!(first.path, show.join("first.jpg"));
    assert_eq!(first.duration, Some(Duration::from_secs(5)));
    assert_eq!(first.display_name, "first");

    let second = catalog.next_entry().unwrap();
    assert_eq!(second.path, PathBuf::from("/abs/second.png"));
    assert_eq!(second.duration, None);

    assert_eq!(catalog.next_entry().unwrap().duration, None);
}

#[test]
fn missing_or_empty_sources_are_errors() {
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("nope");
    assert!(matches!(
        PhotoCatalog::from_directory(&missing, None),
        Err(Error::BadDir(_))
    ));

    let empty = tmp.path().join("empty");
    fs::create_dir_all(empty.join(".hidden")).unwrap();
    fs::write(empty.join("readme.txt"), b"x").unwrap();
    fs::write(empty.join(".hidden").join("x.jpg"), b"x").unwrap();
    assert!(matches!(
        PhotoCatalog::from_directory(&empty, None),
        Err(Error::EmptyCatalog)
    ));

    let list = tmp.path().join("list.txt");
    fs::write(&list, "# nothing here\n123\n").unwrap();
    assert!(matches!(
        PhotoCatalog::from_slideshow_file(&list),
        Err(Error::EmptyCatalog)
    ));
    assert!(matches!(
        PhotoCatalog::from_slideshow_file(&tmp.path().join("absent.txt")),
        Err(Error::Io(_))
    ));
}
