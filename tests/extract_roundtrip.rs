//! Merging images and extracting them again.

mod common;

use common::{write_image, write_jp2, write_pdf, write_tiff};
use image::ImageFormat;
use merge_to_pdf::cli::{run, ExitCode};
use merge_to_pdf::{extract_images, merge_files, MergeOptions};

#[test]
fn test_jp2_bytes_survive_merge_and_extract() {
    let dir = tempfile::tempdir().unwrap();
    let jp2 = write_jp2(&dir.path().join("0_extract.jp2"), 64, 48);
    let tiff = write_tiff(&dir.path().join("4_fits.tiff"), &[(30, 10)]);
    let pdf = dir.path().join("out_extract.pdf");
    merge_files(&[&jp2, &tiff], &pdf, &MergeOptions::default()).unwrap();

    let report = extract_images(&pdf, None).unwrap();

    let expected = vec![
        dir.path().join("out_extract_1.jp2"),
        dir.path().join("out_extract_2.png"),
    ];
    assert_eq!(report.files, expected);
    assert_eq!(
        std::fs::read(&expected[0]).unwrap(),
        std::fs::read(&jp2).unwrap()
    );
    let png = image::open(&expected[1]).unwrap();
    assert_eq!((png.width(), png.height()), (30, 10));
}

#[test]
fn test_prefix_directory_gets_input_name() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_image(&dir.path().join("a.jpg"), 20, 10, ImageFormat::Jpeg);
    let b = write_image(&dir.path().join("b.png"), 10, 20, ImageFormat::Png);
    let pdf = dir.path().join("pair.pdf");
    merge_files(&[&a, &b], &pdf, &MergeOptions::default()).unwrap();

    let out_dir = dir.path().join("images");
    let prefix = format!("{}/", out_dir.display());
    let code = run(vec![
        "-e".to_string(),
        "-p".to_string(),
        prefix,
        pdf.display().to_string(),
    ]);

    assert_eq!(code, ExitCode::Ok);
    assert_eq!(
        std::fs::read(out_dir.join("pair_1.jpg")).unwrap(),
        std::fs::read(&a).unwrap()
    );
    assert!(out_dir.join("pair_2.png").exists());
}

#[test]
fn test_pdf_without_images_extracts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = write_pdf(&dir.path().join("text.pdf"), 2, "T");

    let report = extract_images(&pdf, Some("unused")).unwrap();

    assert!(report.files.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn test_extract_requires_input() {
    assert_eq!(run(["--extract"]), ExitCode::NotEnoughFiles);
}
