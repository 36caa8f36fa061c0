//! KML serialization of [`OutputDocument`]s.
//!
//! Each document carries its aggregate count, link count and content
//! fingerprint as `ExtendedData`, which [`read_baked_state`] reads back on
//! later runs to decide whether the document needs rewriting.

use crate::document::{BakedState, LinkDescriptor, OutputDocument, PointMark};
use crate::error::Result;
use geo::Rect;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";
const STYLE_ID: &str = "s";
const AGGREGATE_KEY: &str = "aggregate_count";
const LINK_KEY: &str = "link_count";
const FINGERPRINT_KEY: &str = "fingerprint";

/// Render a document as a KML string.
pub fn to_kml(document: &OutputDocument) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_document(&mut writer, document)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Read the baked state from a stored document.
///
/// Returns `None` for documents this crate did not write (or that are not
/// well-formed), so they are always treated as stale.
pub fn read_baked_state(text: &str) -> Option<BakedState> {
    let mut reader = Reader::from_str(text);
    let mut data_name: Option<String> = None;
    let mut in_value = false;

    let mut aggregate_count = None;
    let mut link_count = None;
    let mut fingerprint = None;

    loop {
        match reader.read_event().ok()? {
            Event::Eof => break,
            Event::Start(e) => match e.name().as_ref() {
                b"Data" => data_name = name_attribute(&e),
                b"value" => in_value = data_name.is_some(),
                _ => {}
            },
            Event::Text(t) if in_value => {
                let value = t.unescape().ok()?;
                let value = value.trim();
                match data_name.as_deref() {
                    Some(AGGREGATE_KEY) => aggregate_count = value.parse().ok(),
                    Some(LINK_KEY) => link_count = value.parse().ok(),
                    Some(FINGERPRINT_KEY) => fingerprint = u64::from_str_radix(value, 16).ok(),
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"value" => in_value = false,
                b"Data" => data_name = None,
                _ => {}
            },
            _ => {}
        }
    }

    Some(BakedState {
        aggregate_count: aggregate_count?,
        link_count: link_count?,
        fingerprint: fingerprint?,
    })
}

fn name_attribute(event: &BytesStart<'_>) -> Option<String> {
    event
        .attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.as_ref() == b"name")
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn write_document<W: Write>(writer: &mut Writer<W>, doc: &OutputDocument) -> Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut kml = BytesStart::new("kml");
    kml.push_attribute(("xmlns", KML_NAMESPACE));
    writer.write_event(Event::Start(kml))?;
    start(writer, "Document")?;

    text_element(writer, "name", &doc.name)?;
    text_element(writer, "description", &doc.description)?;
    write_style(writer)?;

    let state = doc.baked_state();
    start(writer, "ExtendedData")?;
    data_element(writer, AGGREGATE_KEY, &state.aggregate_count.to_string())?;
    data_element(writer, LINK_KEY, &state.link_count.to_string())?;
    data_element(writer, FINGERPRINT_KEY, &format!("{:016x}", state.fingerprint))?;
    end(writer, "ExtendedData")?;

    if let Some(region) = doc.region {
        write_outline(writer, &doc.name, region, doc.extrude_height)?;
    }
    for link in &doc.links {
        write_link(writer, link)?;
    }
    for point in &doc.points {
        write_point(writer, point)?;
    }

    end(writer, "Document")?;
    end(writer, "kml")
}

fn write_style<W: Write>(writer: &mut Writer<W>) -> Result<()> {
    let mut style = BytesStart::new("Style");
    style.push_attribute(("id", STYLE_ID));
    writer.write_event(Event::Start(style))?;

    start(writer, "LineStyle")?;
    text_element(writer, "color", "ff000000")?;
    end(writer, "LineStyle")?;

    start(writer, "PolyStyle")?;
    text_element(writer, "color", "33000000")?;
    text_element(writer, "colorMode", "random")?;
    text_element(writer, "fill", "1")?;
    end(writer, "PolyStyle")?;

    end(writer, "Style")
}

fn write_outline<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    region: Rect<f64>,
    height: f64,
) -> Result<()> {
    let (min, max) = (region.min(), region.max());
    let ring = [
        (min.x, min.y),
        (max.x, min.y),
        (max.x, max.y),
        (min.x, max.y),
        (min.x, min.y),
    ]
    .iter()
    .map(|(x, y)| format!("{},{},{}", x, y, height))
    .collect::<Vec<_>>()
    .join(" ");

    start(writer, "Placemark")?;
    text_element(writer, "name", name)?;
    text_element(writer, "styleUrl", &format!("#{}", STYLE_ID))?;
    start(writer, "Polygon")?;
    text_element(writer, "extrude", "1")?;
    text_element(writer, "altitudeMode", "relativeToGround")?;
    start(writer, "outerBoundaryIs")?;
    start(writer, "LinearRing")?;
    text_element(writer, "coordinates", &ring)?;
    end(writer, "LinearRing")?;
    end(writer, "outerBoundaryIs")?;
    end(writer, "Polygon")?;
    end(writer, "Placemark")
}

fn write_link<W: Write>(writer: &mut Writer<W>, link: &LinkDescriptor) -> Result<()> {
    let (min, max) = (link.region.min(), link.region.max());

    start(writer, "NetworkLink")?;
    text_element(writer, "name", &link.name)?;
    start(writer, "Region")?;
    start(writer, "LatLonAltBox")?;
    text_element(writer, "north", &max.y.to_string())?;
    text_element(writer, "south", &min.y.to_string())?;
    text_element(writer, "east", &max.x.to_string())?;
    text_element(writer, "west", &min.x.to_string())?;
    end(writer, "LatLonAltBox")?;
    start(writer, "Lod")?;
    text_element(writer, "minLodPixels", &link.lod.min_pixels.to_string())?;
    text_element(writer, "maxLodPixels", &link.lod.max_pixels.to_string())?;
    end(writer, "Lod")?;
    end(writer, "Region")?;
    start(writer, "Link")?;
    text_element(writer, "href", &link.href)?;
    text_element(writer, "viewRefreshMode", "onRegion")?;
    end(writer, "Link")?;
    end(writer, "NetworkLink")
}

fn write_point<W: Write>(writer: &mut Writer<W>, point: &PointMark) -> Result<()> {
    start(writer, "Placemark")?;
    text_element(writer, "name", &point.name)?;
    start(writer, "Point")?;
    text_element(
        writer,
        "coordinates",
        &format!("{},{}", point.position.x, point.position.y),
    )?;
    end(writer, "Point")?;
    end(writer, "Placemark")
}

fn data_element<W: Write>(writer: &mut Writer<W>, key: &str, value: &str) -> Result<()> {
    let mut data = BytesStart::new("Data");
    data.push_attribute(("name", key));
    writer.write_event(Event::Start(data))?;
    text_element(writer, "value", value)?;
    end(writer, "Data")
}

fn text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, tag)
}

fn start<W: Write>(writer: &mut Writer<W>, tag: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    Ok(())
}

fn end<W: Write>(writer: &mut Writer<W>, tag: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
