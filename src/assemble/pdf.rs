//! PDF container: one page per image, the JPEG embedded as-is (DCTDecode).
//!
//! A page measures `pixels * 72 / dpi` points on each axis, so the density
//! carried by the normalized page decides its physical size. The source page
//! numbers are kept in the document information dictionary. No timestamps
//! are written, so identical pages always produce a byte-identical file.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use super::PackedPage;
use super::cbz::ComicInfo;
use super::density::Dpi;

/// Information dictionary key listing the packed source page numbers.
pub const SOURCE_PAGES_KEY: &str = "SourcePages";

const IMAGE_NAME: &str = "Im0";
const POINTS_PER_INCH: f32 = 72.0;

/// Page size in points for a `width` x `height` image at `density`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn page_size_points(width: u32, height: u32, density: Dpi) -> (f32, f32) {
    let x_dpi = f32::from(density.x.max(1));
    let y_dpi = f32::from(density.y.max(1));
    (
        width as f32 * POINTS_PER_INCH / x_dpi,
        height as f32 * POINTS_PER_INCH / y_dpi,
    )
}

fn add_page(document: &mut Document, pages_id: ObjectId, packed: &PackedPage) -> lopdf::Result<ObjectId> {
    let page = &packed.page;
    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(page.width),
            "Height" => i64::from(page.height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        page.jpeg.clone(),
    )
    .with_compression(false);
    let image_id = document.add_object(image);

    let (width_pt, height_pt) = page_size_points(page.width, page.height, page.density);
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width_pt.into(),
                    0.into(),
                    0.into(),
                    height_pt.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = document.add_object(Stream::new(Dictionary::new(), content.encode()?));

    Ok(document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { IMAGE_NAME => image_id },
        },
    }))
}

/// Builds the document for `pages`, in the order given.
///
/// # Errors
///
/// Returns the error when a page content stream cannot be encoded.
pub fn build_pdf(pages: &[PackedPage], info: &ComicInfo) -> lopdf::Result<Document> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for packed in pages {
        kids.push(Object::from(add_page(&mut document, pages_id, packed)?));
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let source_pages = pages
        .iter()
        .map(|p| p.number.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let info_id = document.add_object(dictionary! {
        "Title" => Object::string_literal(format!("{} - {}", info.series, info.title)),
        "Subject" => Object::string_literal(info.series.clone()),
        SOURCE_PAGES_KEY => Object::string_literal(source_pages),
    });
    document.trailer.set("Root", catalog_id);
    document.trailer.set("Info", info_id);
    Ok(document)
}

/// Source page numbers recorded when the document was built.
///
/// # Errors
///
/// Returns the error when the document has no recorded page numbers.
pub fn page_numbers(document: &Document) -> lopdf::Result<Vec<usize>> {
    let info_id = document.trailer.get(b"Info")?.as_reference()?;
    let recorded = document
        .get_dictionary(info_id)?
        .get(SOURCE_PAGES_KEY.as_bytes())?
        .as_str()?;
    Ok(String::from_utf8_lossy(recorded)
        .split_whitespace()
        .filter_map(|n| n.parse().ok())
        .collect())
}

/// The embedded JPEG of every page, in page order.
///
/// # Errors
///
/// Returns the error when a page does not carry an image in the expected place.
pub fn page_images(document: &Document) -> lopdf::Result<Vec<Vec<u8>>> {
    document
        .get_pages()
        .into_values()
        .map(|page_id| {
            let image_id = document
                .get_dictionary(page_id)?
                .get(b"Resources")?
                .as_dict()?
                .get(b"XObject")?
                .as_dict()?
                .get(IMAGE_NAME.as_bytes())?
                .as_reference()?;
            Ok(document.get_object(image_id)?.as_stream()?.content.clone())
        })
        .collect()
}
