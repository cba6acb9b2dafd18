use super::*;
use crate::html::parse_fragment;

#[test]
fn fragment_round_trips_through_inner_html() -> Result<()> {
    let markup = r#"<p class="x" title="a &amp; &quot;b&quot;">1 &lt; 2 &amp; 3</p><!-- note --><br><img src="a.png" alt="">"#;
    let mut dom = Dom::from_html("<div id=\"host\"></div>")?;
    let host = find(&dom, "#host")?;

    dom.set_inner_html(host, markup)?;
    let first = dom.inner_html(host)?;
    dom.set_inner_html(host, &first)?;

    assert_eq!(first, markup);
    assert_eq!(dom.inner_html(host)?, first);
    Ok(())
}

#[test]
fn attribute_order_is_preserved() -> Result<()> {
    let dom = Dom::from_html(r#"<a z="1" href="/x" b="2">go</a>"#)?;
    let a = find(&dom, "a")?;

    let names: Vec<String> = dom.attributes(a).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["z", "href", "b"]);
    Ok(())
}

#[test]
fn raw_text_elements_keep_markup_like_text() -> Result<()> {
    let dom = Dom::from_html("<style>.a > .b { color: red; }</style><script>if (a < b) {}</script>")?;
    let style = find(&dom, "style")?;
    let script = find(&dom, "script")?;

    assert_eq!(dom.text_content(style), ".a > .b { color: red; }");
    assert_eq!(dom.inner_html(script)?, "if (a < b) {}");
    Ok(())
}

#[test]
fn svg_children_inherit_the_svg_namespace() -> Result<()> {
    let dom = parse_fragment(
        "<svg><path d=\"M0\"></path><foreignObject><div></div></foreignObject></svg>",
        Namespace::Html,
    )?;
    let path = find(&dom, "path")?;
    let div = find(&dom, "div")?;

    assert_eq!(dom.namespace(path), Some(Namespace::Svg));
    assert_eq!(dom.namespace(div), Some(Namespace::Html));
    Ok(())
}

#[test]
fn bare_and_duplicate_attributes() -> Result<()> {
    let dom = Dom::from_html(r#"<input disabled id="first" id="second">"#)?;
    let input = find(&dom, "input")?;

    assert_eq!(dom.attr(input, "disabled"), Some(""));
    assert_eq!(dom.attr(input, "id"), Some("first"));
    Ok(())
}

#[test]
fn unterminated_markup_is_a_parse_error() {
    assert!(matches!(
        Dom::from_html("<div><!-- open"),
        Err(Error::HtmlParse(_))
    ));
    assert!(matches!(
        Dom::from_html("<div class=\"x"),
        Err(Error::HtmlParse(_))
    ));
}

#[test]
fn stray_end_tags_are_ignored() -> Result<()> {
    let dom = Dom::from_html("<div><span>a</b></span></p>tail</div>")?;
    let div = find(&dom, "div")?;

    assert_eq!(dom.inner_html(div)?, "<span>a</span>tail");
    Ok(())
}
