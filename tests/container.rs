use icnsutil::{
    ElementReader, ExportOptions, Exported, IcnsError, IconElement, IconFamily, OSType,
    WriteOptions, DARK_OSTYPE, TOC_OSTYPE,
};
use icnsutil::packbits::pack;
use std::fs;
use std::path::Path;

const CH_255: [u8; 4] = [0xFF, 0xFF, 0xFB, 0xFF];
const CH_128: [u8; 4] = [0xFF, 0x80, 0xFB, 0x80];
const CH_000: [u8; 4] = [0xFF, 0x00, 0xFB, 0x00];

fn argb_16x16() -> Vec<u8> {
    [&b"ARGB"[..], &CH_255, &CH_128, &CH_000, &CH_255].concat()
}

fn rgb_16x16() -> Vec<u8> {
    [&CH_000[..], &CH_128, &CH_255].concat()
}

fn sample_family() -> IconFamily {
    let mut family = IconFamily::new();
    family.insert(IconElement::new(OSType(*b"ic04"), argb_16x16()));
    let channel = pack(&[0x10; 1024]);
    family.insert(IconElement::new(OSType(*b"il32"), channel.repeat(3)));
    family.insert(IconElement::new(OSType(*b"l8mk"), vec![0x80; 1024]));
    family.insert(IconElement::new(OSType(*b"name"), b"sample".to_vec()));
    family
}

#[test]
fn save_and_reopen_preserves_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.icns");
    let family = sample_family();
    family.save(&path, &WriteOptions { toc: false }).unwrap();

    let reopened = IconFamily::open(&path).unwrap();
    assert_eq!(reopened.source(), Some(path.as_path()));
    assert_eq!(reopened.keys(), family.keys());
    for element in family.elements() {
        assert_eq!(reopened.get(element.ostype).unwrap().data, element.data);
    }
    assert_eq!(fs::read(&path).unwrap(), family.to_bytes(false));
}

#[test]
fn toc_written_first_and_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("toc.icns");
    let mut family = sample_family();
    family.save(&path, &WriteOptions::default()).unwrap();

    let elements: Vec<IconElement> = ElementReader::open(&path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(elements[0].ostype, TOC_OSTYPE);
    assert_eq!(elements[0].data.len(), 8 * family.len());
    assert_eq!(&elements[0].data[..4], b"ic04");

    // A stale table of contents is never trusted.
    family.remove_media(OSType(*b"name"));
    let mut reopened = IconFamily::open(&path).unwrap();
    assert!(reopened.has_toc());
    reopened.remove_media(OSType(*b"name"));
    assert_eq!(reopened.to_bytes(true), family.to_bytes(true));
    assert_eq!(reopened.total_length(true) as usize, reopened.to_bytes(true).len());
}

#[test]
fn parse_rejects_non_icns_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.icns");
    fs::write(&path, b"\x89PNG\x0d\x0a\x1a\x0a").unwrap();
    assert!(matches!(IconFamily::open(&path), Err(IcnsError::Parse(_))));
    assert!(matches!(IconFamily::verify_file(&path), Err(IcnsError::Parse(_))));
    assert!(matches!(ElementReader::open(&path), Err(IcnsError::Parse(_))));
}

#[test]
fn verify_sample_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.icns");
    sample_family().save(&path, &WriteOptions::default()).unwrap();
    let issues = IconFamily::verify_file(&path).unwrap();
    assert!(issues.is_empty(), "unexpected issues: {:?}", issues);

    let mut family = sample_family();
    family.remove_media(OSType(*b"l8mk"));
    family.insert(IconElement::new(OSType(*b"t8mk"), vec![0; 100]));
    family.save(&path, &WriteOptions::default()).unwrap();
    let issues: Vec<String> = IconFamily::verify_file(&path)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        issues,
        vec![
            "invalid data length for t8mk: 100 != 16384".to_string(),
            "Missing key pair: il32 found, mask missing.".to_string(),
            "Missing key pair: t8mk found, image missing.".to_string(),
        ]
    );
}

#[test]
fn describe_sample_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.icns");
    sample_family().save(&path, &WriteOptions::default()).unwrap();
    let text = IconFamily::describe_file(&path, true, 2).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "  TOC : 32 bytes, offset: 8, bin: TOC ");
    assert_eq!(lines[1], "  ic04: 20 bytes, offset: 48, argb: 16x16");
    assert_eq!(lines[2], "  il32: 48 bytes, offset: 76, rgb: 32x32");
    assert_eq!(lines[3], "  l8mk: 1024 bytes, offset: 132, bin: 32x32");
    assert_eq!(lines[4], "  name: 6 bytes, offset: 1164, value: \"sample\"");
}

#[test]
fn add_media_files_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let rgb = dir.path().join("icon.rgb");
    fs::write(&rgb, rgb_16x16()).unwrap();
    let mask = dir.path().join("s8mk.bin");
    fs::write(&mask, vec![0xFF; 256]).unwrap();

    let mut family = IconFamily::new();
    assert_eq!(family.add_media_file(&rgb, None, false).unwrap(), OSType(*b"is32"));
    assert_eq!(family.add_media_file(&mask, None, false).unwrap(), OSType(*b"s8mk"));
    assert!(family.add_media_file(&mask, None, false).is_err());
    assert_eq!(
        family.add_media_file(&mask, Some(OSType(*b"l8mk")), false).unwrap(),
        OSType(*b"l8mk")
    );
    let image = family.get_image(OSType(*b"is32")).unwrap();
    assert_eq!(&image.data()[..4], &[0, 128, 255, 255]);
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn export_by_size_and_key() {
    let dir = tempfile::tempdir().unwrap();
    let family = sample_family();
    let report = family
        .export(&ExportOptions {
            outdir: Some(dir.path().to_path_buf()),
            ..ExportOptions::default()
        })
        .unwrap();
    assert_eq!(report.entries.len(), 4);
    assert_eq!(
        file_names(dir.path()),
        vec!["16x16.argb", "32x32-mask8b.bin", "32x32.rgb", "name.bin"]
    );
    assert_eq!(fs::read(dir.path().join("16x16.argb")).unwrap(), argb_16x16());

    let keyed = tempfile::tempdir().unwrap();
    family
        .export(&ExportOptions {
            outdir: Some(keyed.path().to_path_buf()),
            key_suffix: true,
            decompress: true,
            allowed_ext: Some(vec!["rgb".to_string()]),
            ..ExportOptions::default()
        })
        .unwrap();
    assert_eq!(file_names(keyed.path()), vec!["il32.rgb"]);
    assert_eq!(fs::read(keyed.path().join("il32.rgb")).unwrap(), vec![0x10; 3072]);
}

#[test]
fn export_requires_existing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");
    let result = sample_family().export(&ExportOptions {
        outdir: Some(missing),
        ..ExportOptions::default()
    });
    assert!(matches!(result, Err(IcnsError::InvalidArgument(_))));
}

#[test]
fn export_nested_containers_recursively() {
    let dir = tempfile::tempdir().unwrap();
    let mut nested = IconFamily::new();
    nested.insert(IconElement::new(OSType(*b"ic04"), argb_16x16()));
    let mut family = IconFamily::new();
    family.insert(IconElement::new(OSType(*b"ic05"), vec![0; 16]));
    family
        .add_media(None, nested.to_bytes(false), Some("dark.icns"), false)
        .unwrap();
    assert_eq!(family.keys()[1], DARK_OSTYPE);
    let path = dir.path().join("parent.icns");
    family.save(&path, &WriteOptions { toc: false }).unwrap();

    let report = IconFamily::open(&path)
        .unwrap()
        .export(&ExportOptions {
            recursive: true,
            allowed_ext: Some(vec!["argb".to_string()]),
            ..ExportOptions::default()
        })
        .unwrap();
    let outdir = dir.path().join("parent.icns.export");
    assert_eq!(report.outdir, outdir);
    assert_eq!(report.entries.len(), 1);
    let (key, exported) = &report.entries[0];
    assert_eq!(*key, DARK_OSTYPE);
    let inner = match exported {
        Exported::Nested(inner) => inner,
        Exported::File(path) => panic!("not recursed into {}", path.display()),
    };
    assert_eq!(inner.outdir, outdir.join("dark.icns.export"));
    assert_eq!(file_names(&inner.outdir), vec!["16x16.argb"]);
    // The intermediate container was only exported for recursion.
    assert!(!outdir.join("dark.icns").exists());
}

#[cfg(feature = "pngio")]
#[test]
fn export_converts_raw_images_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let report = sample_family()
        .export(&ExportOptions {
            outdir: Some(dir.path().to_path_buf()),
            convert_png: true,
            allowed_ext: Some(vec!["png".to_string()]),
            ..ExportOptions::default()
        })
        .unwrap();
    assert_eq!(file_names(dir.path()), vec!["16x16.png", "32x32.png"]);
    let keys: Vec<OSType> = report.entries.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![OSType(*b"il32"), OSType(*b"l8mk"), OSType(*b"ic04")]);

    let png = fs::read(dir.path().join("32x32.png")).unwrap();
    let image = icnsutil::Image::read_png(std::io::Cursor::new(png)).unwrap();
    assert_eq!((image.width(), image.height()), (32, 32));
    assert_eq!(&image.data()[..4], &[0x10, 0x10, 0x10, 0x80]);
}
