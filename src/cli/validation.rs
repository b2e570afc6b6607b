use crate::cli::args::CliArgs;
use crate::records::is_temporal_field;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(size) = args.page_size {
        crate::view::PageSize::new(size).map_err(|e| format!("invalid --page-size: {e}"))?;
    }
    if args.page == Some(0) {
        return Err("invalid page, expected positive integer".to_string());
    }
    if args.max_pages == Some(0) {
        return Err("invalid max-pages, expected positive integer".to_string());
    }
    if args.timeout == Some(0) {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    if let Some(raw) = args.from.as_deref() {
        crate::filter::parse_instant(raw).ok_or_else(|| format!("invalid --from '{raw}'"))?;
    }
    if let Some(raw) = args.to.as_deref() {
        crate::filter::parse_instant(raw).ok_or_else(|| format!("invalid --to '{raw}'"))?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        crate::output::OutputFormat::parse(raw)
            .ok_or_else(|| format!("invalid --output-format '{raw}', expected csv, json or text"))?;
    }

    let has_range = args.from.is_some() || args.to.is_some();
    let has_values = !args.value.is_empty() || args.none;
    match args.field.as_deref() {
        Some(field) if is_temporal_field(field) && has_values => {
            return Err(format!(
                "--value cannot be used with date field '{field}', use --from/--to"
            ));
        }
        Some(field) if !is_temporal_field(field) && has_range => {
            return Err(format!(
                "--from/--to need a date field (createdAt or updatedAt), got '{field}'"
            ));
        }
        None if has_range => {
            return Err("--from/--to need --field createdAt or --field updatedAt".to_string());
        }
        _ => {}
    }
    if args.single_value && args.value.len() > 1 {
        return Err("--single-value accepts a single --value".to_string());
    }
    if let Some(name) = args.contact_list.as_deref() {
        if name.trim().is_empty() {
            return Err("Contact list name is required.".to_string());
        }
    }
    Ok(())
}
