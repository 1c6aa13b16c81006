use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use blogpost::{
    loader::{load_named_posts, DirSource, DEFAULT_POSTS},
    markdown::{self, MarkdownOptions},
    ParsedPost, PostMetadata,
};
use clap::{command, Arg, ArgAction};
use log::info;

/// `<slug>.html`, or the source file stem for posts without a slug.
fn output_name(post: &ParsedPost, file: &str) -> String {
    let stem = post.meta().slug.clone().unwrap_or_else(|| {
        Path::new(file)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string())
    });
    format!("{stem}.html")
}

fn write_out(out_dir: &Path, posts: &[(&str, ParsedPost)]) -> anyhow::Result<()> {
    fs_extra::dir::create_all(out_dir, false)
        .with_context(|| format!("while creating {out_dir:?}"))?;

    for (file, post) in posts {
        let path = out_dir.join(output_name(post, file));
        std::fs::write(&path, post.html()).with_context(|| format!("while writing {path:?}"))?;
        info!("wrote {path:?}");
    }

    let index_path = out_dir.join("index.json");
    let index: Vec<&PostMetadata> = posts.iter().map(|(_, post)| post.meta()).collect();
    let writer = BufWriter::new(
        File::create(&index_path).with_context(|| format!("while creating {index_path:?}"))?,
    );
    serde_json::to_writer_pretty(writer, &index)
        .with_context(|| format!("while writing {index_path:?}"))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = command!()
        .args(&[
            Arg::new("post_dir")
                .help("Directory path of posts")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("blogposts"),
            Arg::new("files")
                .help("Post files to load, relative to post_dir. Defaults to the site's posts.")
                .num_args(0..),
            Arg::new("out")
                .long("out")
                .help("Directory to write <slug>.html fragments and index.json into. Prints JSON to stdout if omitted.")
                .value_parser(clap::value_parser!(PathBuf)),
            Arg::new("no_breaks")
                .long("no-breaks")
                .help("Keep single newlines as soft breaks")
                .action(ArgAction::SetTrue),
            Arg::new("no_highlight")
                .long("no-highlight")
                .help("Disable syntax highlighting of code blocks")
                .action(ArgAction::SetTrue),
            Arg::new("no_math")
                .long("no-math")
                .help("Disable $...$ and $$...$$ math")
                .action(ArgAction::SetTrue),
        ])
        .get_matches();

    let Some(post_dir) = matches.get_one::<PathBuf>("post_dir") else {
        bail!("post_dir is required.");
    };
    if !post_dir.is_dir() {
        bail!("post_dir must be a directory.");
    }
    let files: Vec<&str> = match matches.get_many::<String>("files") {
        Some(files) => files.map(String::as_str).collect(),
        None => DEFAULT_POSTS.to_vec(),
    };

    let renderer = markdown::init(MarkdownOptions {
        hard_breaks: !matches.get_flag("no_breaks"),
        highlight: !matches.get_flag("no_highlight"),
        math: !matches.get_flag("no_math"),
    })?;

    let source = DirSource::new(post_dir);
    let posts = load_named_posts(&source, renderer, &files);
    info!("loaded {} of {} posts", posts.len(), files.len());

    match matches.get_one::<PathBuf>("out") {
        Some(out_dir) => write_out(out_dir, &posts)?,
        None => {
            let posts: Vec<&ParsedPost> = posts.iter().map(|(_, post)| post).collect();
            let mut writer = BufWriter::new(std::io::stdout().lock());
            serde_json::to_writer_pretty(&mut writer, &posts)?;
            writeln!(writer)?;
        }
    }

    Ok(())
}
