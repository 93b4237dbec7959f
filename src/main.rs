use classcodec::jvm::verifier::ClassHierarchy;
use classcodec::jvm::{self, ClassReader, ClassWriter, ReaderFlags, WriterFlags};

use clap::{crate_version, Arg, ArgAction, Command};
use std::fs;
use std::path::Path;

/// Record the superclass of every `.class` file under `dir`
///
/// Files that do not parse are skipped with a warning.
fn load_class_path(dir: &Path, hierarchy: &mut ClassHierarchy) -> Result<(), jvm::Error> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            load_class_path(&path, hierarchy)?;
        } else if path.extension().map_or(false, |extension| extension == "class") {
            let class_bytes = fs::read(&path)?;
            if let Err(err) = hierarchy.add_class_file(&class_bytes) {
                log::warn!("Skipping '{}': {}", path.display(), err);
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), jvm::Error> {
    env_logger::init();

    let matches = Command::new("Class file re-encoder")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Reads a JVM class file and writes it back out through the class writer")
        .arg(
            Arg::new("INPUT")
                .help("Class file to read")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT")
                .help("Where to write the result (defaults to overwriting the input)"),
        )
        .arg(
            Arg::new("compute")
                .long("compute")
                .value_name("WHAT")
                .value_parser(["frames", "maxs", "none"])
                .default_value("frames")
                .help("What to recompute in method bodies"),
        )
        .arg(
            Arg::new("fresh pool")
                .long("fresh-pool")
                .action(ArgAction::SetTrue)
                .help("Build a new constant pool instead of starting from the input's (fails on attributes that can only be copied as is)"),
        )
        .arg(
            Arg::new("class path")
                .long("class-path")
                .value_name("DIR")
                .action(ArgAction::Append)
                .help("Directory of class files used to find common superclasses when computing frames"),
        )
        .arg(
            Arg::new("skip debug")
                .long("skip-debug")
                .action(ArgAction::SetTrue)
                .help("Drop source file, line number, and local variable information"),
        )
        .get_matches();

    let writer_flags = match matches.get_one::<String>("compute").map(String::as_str) {
        Some("maxs") => WriterFlags::COMPUTE_MAXS,
        Some("none") => WriterFlags::empty(),
        _ => WriterFlags::COMPUTE_FRAMES,
    };
    let mut reader_flags = ReaderFlags::empty();
    if matches.get_flag("skip debug") {
        reader_flags |= ReaderFlags::SKIP_DEBUG;
    }

    // `INPUT` is required, so clap has already rejected a missing value
    let input = matches
        .get_one::<String>("INPUT")
        .map(String::as_str)
        .unwrap_or_default();
    let output = matches
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or(input);

    let mut hierarchy = ClassHierarchy::new();
    for dir in matches.get_many::<String>("class path").into_iter().flatten() {
        load_class_path(Path::new(dir), &mut hierarchy)?;
    }
    log::debug!("Class path gives the superclasses of {} classes", hierarchy.len());

    log::info!("Reading '{}'", input);
    let class_bytes = fs::read(input)?;
    let reader = ClassReader::new(&class_bytes)?;
    let writer = if matches.get_flag("fresh pool") {
        ClassWriter::new(writer_flags)
    } else {
        ClassWriter::from_reader(&reader, writer_flags)?
    };
    let mut writer = writer.with_hierarchy(hierarchy);
    reader.accept(&mut writer, reader_flags)?;
    let rewritten = writer.to_bytes()?;

    log::info!(
        "Writing '{}' ({} bytes, was {})",
        output,
        rewritten.len(),
        class_bytes.len()
    );
    fs::write(output, rewritten)?;
    Ok(())
}
