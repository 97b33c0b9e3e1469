use autoroute_core::prefix::{PathMatcher, TextMarshaller};
use autoroute_core::util::normalize;
use autoroute_core::RoutingConfig;
use std::path::Path;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Allowed")]
    allowed: &'static str,
}

pub fn run(
    config: &RoutingConfig,
    prefix_file: &Path,
    paths: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let marshaller = TextMarshaller::new(
        config.prefix_file_max_entries,
        config.prefix_file_max_line_length,
    );
    let list = marshaller.unmarshal(&std::fs::read(prefix_file)?)?;
    if !list.supported {
        println!(
            "{} is marked unsupported, every path is allowed.",
            prefix_file.display()
        );
        return Ok(());
    }

    let matcher = PathMatcher::new(&list.entries, usize::MAX)?;
    let rows: Vec<CheckRow> = paths
        .iter()
        .map(|path| {
            let path = normalize(path, usize::MAX);
            let allowed = if matcher.matches(&path) { "yes" } else { "no" };
            CheckRow { path, allowed }
        })
        .collect();

    println!("{} prefixes loaded from {}", list.entries.len(), prefix_file.display());
    println!("{}", Table::new(rows));
    Ok(())
}
