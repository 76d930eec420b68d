//! End-to-end tests: TOML configuration → StackFactory → stack_image, with
//! real files, the real `image` crate processor and real storage.

use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
use image_stack::backend::BackendError;
use image_stack::config::parse_config;
use image_stack::factory::StackFactory;
use image_stack::types::{Image, ImagePath};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn encode(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    encode(&RgbaImage::from_pixel(width, height, Rgba(color)), ImageFormat::Png)
}

/// `img/cat.png` (300x200) under a fresh temp dir.
fn fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("img")).unwrap();
    fs::write(
        tmp.path().join("img/cat.png"),
        solid_png(300, 200, [40, 80, 120, 255]),
    )
    .unwrap();
    tmp
}

fn thumbs_config(root: &Path) -> String {
    format!(
        r#"
[stacks.thumbs]
backend = "originals"
manipulators = ["thumbnail"]
storage = "public"

[backends.originals]
driver = "path_rule"
backend = {{ driver = "file", root = '{root}/img' }}
rules = [['^t_\d+x\d+/(.+)$', '$1']]

[manipulators.thumbnail]
driver = "thumbnailer"
rules = [
    ['^t_(\d+)x(\d+)/', '{{1}}x{{2}}'],
]

[storages.public]
driver = "file"
root = '{root}/public'
use_prefix = true
"#,
        root = root.display()
    )
}

fn factory(toml: &str) -> StackFactory {
    StackFactory::new(parse_config(toml).unwrap()).unwrap()
}

#[test]
fn thumbnail_stack_fetches_resizes_and_stores() {
    let tmp = fixtures();
    let factory = factory(&thumbs_config(tmp.path()));
    let stack = factory.stack("thumbs").unwrap();

    let path = ImagePath::new("thumbs", "t_100x50/cat.png");
    let result = stack.stack_image(&path).unwrap();

    assert!(result.storage_warning.is_none());
    assert_eq!(result.image.mime_type(), "image/png");
    let decoded = image::load_from_memory(result.image.bytes()).unwrap();
    assert_eq!(decoded.dimensions(), (100, 50));

    let stored = tmp.path().join("public/thumbs/t_100x50/cat.png");
    assert_eq!(fs::read(stored).unwrap(), result.image.bytes());
}

#[test]
fn unmatched_path_passes_through_unchanged() {
    let tmp = fixtures();
    let factory = factory(&thumbs_config(tmp.path()));

    let result = factory
        .stack("thumbs")
        .unwrap()
        .stack_image(&ImagePath::new("thumbs", "cat.png"))
        .unwrap();
    assert_eq!(
        result.image.bytes(),
        fs::read(tmp.path().join("img/cat.png")).unwrap()
    );
}

#[test]
fn missing_original_is_not_found_and_nothing_is_stored() {
    let tmp = fixtures();
    let factory = factory(&thumbs_config(tmp.path()));

    let err = factory
        .stack("thumbs")
        .unwrap()
        .stack_image(&ImagePath::new("thumbs", "t_100x50/dog.png"))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!tmp.path().join("public").exists());
}

#[test]
fn cached_origin_is_fetched_once_and_converted_each_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let png = solid_png(8, 8, [255, 255, 255, 255]);

    let factory = factory(
        r#"
[stack]
backend = { driver = "cache", backend = "origin", cache = { driver = "memory" } }
manipulators = [{ driver = "converter", conversions = { "image/png" = "jpeg" }, quality = 80 }]

[backends.origin]
driver = "callback"
callback = "origin"
"#,
    )
    .with_callback(
        "origin",
        Arc::new(move |path: &ImagePath| {
            counter.fetch_add(1, Ordering::SeqCst);
            if path.path() == "white.png" {
                Ok(Image::new(png.clone(), "image/png"))
            } else {
                Err(BackendError::not_found(path))
            }
        }),
    );
    let stack = factory.default_stack().unwrap();
    let path = ImagePath::new("default", "white.png");

    let first = stack.stack_image(&path).unwrap();
    let second = stack.stack_image(&path).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.image.mime_type(), "image/jpeg");
    assert_eq!(&first.image.bytes()[..2], &[0xFF, 0xD8]);
    assert_eq!(first.image.bytes(), second.image.bytes());

    // Misses are never cached
    let missing = ImagePath::new("default", "other.png");
    assert!(stack.stack_image(&missing).unwrap_err().is_not_found());
    assert!(stack.stack_image(&missing).unwrap_err().is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn sequential_backend_falls_back_in_order() {
    let tmp = fixtures();
    let factory = factory(&format!(
        r#"
[stacks.any]
backend = {{ driver = "sequential", backends = ["empty", "images"] }}

[backends.empty]
driver = "file"
root = '{root}/nothing-here'

[backends.images]
driver = "file"
root = '{root}/img'
"#,
        root = tmp.path().display()
    ));

    let result = factory
        .stack("any")
        .unwrap()
        .stack_image(&ImagePath::new("any", "cat.png"))
        .unwrap();
    assert_eq!(
        image::load_from_memory(result.image.bytes())
            .unwrap()
            .dimensions(),
        (300, 200)
    );
}

#[test]
fn watermark_is_composited_at_anchor() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("img")).unwrap();
    fs::write(
        tmp.path().join("img/base.png"),
        solid_png(40, 40, [255, 255, 255, 255]),
    )
    .unwrap();
    fs::write(tmp.path().join("logo.png"), solid_png(10, 10, [255, 0, 0, 255])).unwrap();

    let factory = factory(&format!(
        r#"
[stack]
backend = {{ driver = "file", root = '{root}/img' }}
manipulators = ["logo"]

[manipulators.logo]
driver = "watermark"
watermark = '{root}/logo.png'
anchor = "top left"
reduce = "none"
"#,
        root = tmp.path().display()
    ));

    let result = factory
        .default_stack()
        .unwrap()
        .stack_image(&ImagePath::new("default", "base.png"))
        .unwrap();
    let out = image::load_from_memory(result.image.bytes())
        .unwrap()
        .to_rgba8();

    assert_eq!(out.dimensions(), (40, 40));
    assert_eq!(out.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    assert_eq!(out.get_pixel(9, 9), &Rgba([255, 0, 0, 255]));
    assert_eq!(out.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    assert_eq!(out.get_pixel(39, 39), &Rgba([255, 255, 255, 255]));
}

#[test]
fn check_constructs_every_entry_of_stock_config() {
    let factory = factory(image_stack::config::stock_config_toml());
    factory.warm_up().unwrap();
    assert!(factory.stacks().is_constructed("thumbs"));
}
