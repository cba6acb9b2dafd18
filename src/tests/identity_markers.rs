use super::*;
use crate::identity::{assign_id, generate_id, retire_markers};

#[test]
fn ids_carry_prefix_tag_and_first_class() -> Result<()> {
    let dom = profile_page()?;
    let header = find(&dom, "#header")?;
    let config = TrackerConfig::default();

    let id = generate_id(&dom, header, &config);
    let parts: Vec<&str> = id.as_str().split('_').collect();

    assert_eq!(parts.len(), 5);
    assert_eq!(&parts[..3], &["theme", "div", "header"]);
    assert!(parts[3].parse::<u128>().is_ok());
    assert_eq!(parts[4].len(), 10);
    Ok(())
}

#[test]
fn ids_do_not_repeat() -> Result<()> {
    let dom = profile_page()?;
    let header = find(&dom, "#header")?;
    let config = TrackerConfig::default();

    let first = generate_id(&dom, header, &config);
    let second = generate_id(&dom, header, &config);
    assert_ne!(first, second);
    Ok(())
}

#[test]
fn kind_markers_are_mutually_exclusive() -> Result<()> {
    let mut dom = profile_page()?;
    let header = find(&dom, "#header")?;
    let config = TrackerConfig::default();

    assign_id(&mut dom, header, RecordKind::Created, &config)?;
    let id = assign_id(&mut dom, header, RecordKind::Modified, &config)?;

    assert_eq!(dom.attr(header, "data-theme-modified"), Some("true"));
    assert!(!dom.has_attr(header, "data-theme-created"));
    assert_eq!(dom.attr(header, "data-theme-id"), Some(id.as_str()));

    retire_markers(&mut dom, header, &config)?;
    assert!(!dom.has_attr(header, "data-theme-modified"));
    assert!(!dom.has_attr(header, "data-theme-id"));
    Ok(())
}

#[test]
fn class_string_degrades_instead_of_failing() -> Result<()> {
    let dom = Dom::from_html(r#"<svg class="octicon"></svg><p>text</p><span></span>"#)?;
    let svg = find(&dom, "svg")?;
    let p = find(&dom, "p")?;
    let span = find(&dom, "span")?;
    let text = dom.children(p)[0];

    assert_eq!(class_string(&dom, svg), "octicon");
    assert_eq!(class_string(&dom, text), "");
    assert_eq!(class_string(&dom, span), "");
    Ok(())
}

#[test]
fn ids_for_unclassed_svg_still_generate() -> Result<()> {
    let dom = Dom::from_html("<svg></svg>")?;
    let svg = find(&dom, "svg")?;

    let id = generate_id(&dom, svg, &TrackerConfig::default());
    assert!(id.as_str().starts_with("theme_svg__"));
    Ok(())
}
