//! Resolves every deferred object in a [`Generator`] and serializes the
//! finished registries to a classic-xref PDF byte stream: header, every
//! indirect object in `N 0 obj ... endobj` form, the cross-reference
//! table, and the trailer.
//!
//! Nothing here mutates application-visible state beyond the generator's
//! own `written` flag (enforced by [`Generator::mark_written`]); this
//! module only ever turns already-registered resources into bytes.

use std::collections::HashMap;

use crate::annotation::{Actions, Annotation as AnnotationKind, BorderArray, ColorArray, Destination};
use crate::bytes::{deflate, hexstring, quote_pdf_literal_string, quote_pdf_name};
use crate::document::*;
use crate::draw::sanitize_separation_name;
use crate::errors::Result;
use crate::graphics::{extgstate_to_dict, Rect};
use crate::icc::{IccColorSpace, IccProfile};
use crate::object_formatter::ObjectFormatter;
use crate::{date, utils};

/// Serializes `generator` to a complete PDF byte stream. Consumes the
/// generator's "may only write once" guard; a second call returns
/// [`crate::errors::Error::WritingTwice`].
pub fn write(generator: &mut Generator) -> Result<Vec<u8>> {
    generator.mark_written()?;

    let aux = allocate_auxiliary_objects(generator);
    resolve_images(generator)?;
    resolve_pages(generator, &aux)?;
    resolve_deferred_objects(generator, &aux)?;
    resolve_auxiliary_objects(generator, &aux)?;

    let catalog_object = build_catalog(generator, &aux)?;
    let info_object = build_document_info(generator, &aux)?;

    assemble(generator, catalog_object, info_object)
}

/// Object numbers for registries that don't carry their own
/// `object_number` field (graphics states, functions, shadings, ICC
/// profiles), plus the handful of document-wide singletons (pages root,
/// struct tree root, AcroForm, output intent profile, XMP metadata,
/// embedded-file name tree) that only the writer allocates.
struct Aux {
    graphics_states: Vec<ObjectNumber>,
    functions: Vec<ObjectNumber>,
    shadings: Vec<ObjectNumber>,
    icc_profiles: Vec<ObjectNumber>,
    pages_root: ObjectNumber,
    struct_tree_root: Option<ObjectNumber>,
    acro_form: Option<ObjectNumber>,
    output_intent: Option<ObjectNumber>,
    metadata: Option<ObjectNumber>,
    embedded_files_names: Option<ObjectNumber>,
}

fn allocate_auxiliary_objects(generator: &mut Generator) -> Aux {
    let graphics_states = (0..generator.graphics_state_len())
        .map(|_| generator.allocate_object())
        .collect();
    let functions = (0..generator.function_len()).map(|_| generator.allocate_object()).collect();
    let shadings = (0..generator.shading_len()).map(|_| generator.allocate_object()).collect();
    let icc_profiles = (0..generator.icc_profile_len())
        .map(|_| generator.allocate_object())
        .collect();

    let pages_root = generator.ensure_pages_root();

    let struct_tree_root = if generator.structure_item_len() > 0 {
        Some(generator.allocate_object())
    } else {
        None
    };
    let acro_form = if generator.form_widget_len() > 0 {
        Some(generator.allocate_object())
    } else {
        None
    };
    let output_intent = if generator.properties.conformance.must_have_icc_profile() {
        Some(generator.allocate_object())
    } else {
        None
    };
    let metadata = if generator.properties.conformance.must_have_xmp_metadata() {
        Some(generator.allocate_object())
    } else {
        None
    };
    let embedded_files_names = if generator.embedded_file_len() > 0 {
        Some(generator.allocate_object())
    } else {
        None
    };

    Aux {
        graphics_states,
        functions,
        shadings,
        icc_profiles,
        pages_root,
        struct_tree_root,
        acro_form,
        output_intent,
        metadata,
        embedded_files_names,
    }
}

// --- images --------------------------------------------------------------

/// `Generator::add_image`/`embed_jpg` register a stream object with an
/// empty placeholder dictionary (they know the pixel bytes but not the
/// final `/ColorSpace`/`/Width`/`/Height` dict shape, which is the
/// writer's job); this rewrites each image object's dictionary in place,
/// preserving whatever stream bytes were already attached.
fn resolve_images(generator: &mut Generator) -> Result<()> {
    let target_cs = generator.properties.output_color_space;
    let color_space_name = icc_color_space_name(target_cs);

    for i in 0..generator.image_registry_len() {
        let entry = generator.image_registry_entry(ImageId::from_index(i))?;
        let object_number = entry.object_number;
        let smask_object = entry.smask_object;
        let width = entry.width;
        let height = entry.height;
        let is_mask = matches!(entry.mask_mode, ImageMaskMode::Stencil);

        let existing = generator.take_object(object_number);
        let (is_jpeg, stream) = match existing {
            PdfObject::Full { stream: Some(stream), .. } => (true, stream),
            PdfObject::Deflate { stream, .. } => (false, stream),
            other => {
                generator.set_object(object_number, other);
                continue;
            }
        };

        let mut f = ObjectFormatter::new();
        f.begin_dict();
        f.add_name("Type");
        f.add_name("XObject");
        f.add_name("Subtype");
        f.add_name("Image");
        f.add_name("Width");
        f.add_integer(width as i64);
        f.add_name("Height");
        f.add_integer(height as i64);
        if is_mask {
            f.add_name("ImageMask");
            f.add_bool(true);
        } else {
            f.add_name("ColorSpace");
            f.add_name(if is_jpeg { "DeviceRGB" } else { color_space_name });
            f.add_name("BitsPerComponent");
            f.add_integer(8);
        }
        if let Some(smask) = smask_object {
            f.add_name("SMask");
            f.add_object_ref(smask);
        }
        if is_jpeg {
            f.add_name("Filter");
            f.add_name("DCTDecode");
        }
        f.end_dict();

        if is_jpeg {
            generator.set_object(object_number, PdfObject::Full { dict: f.steal(), stream: Some(stream) });
        } else {
            generator.set_object(object_number, PdfObject::Deflate { dict_prefix: strip_trailing_close(f.steal()), stream });
        }

        if let Some(smask) = smask_object {
            let smask_existing = generator.take_object(smask);
            if let PdfObject::Deflate { stream: alpha, .. } = smask_existing {
                let mut sf = ObjectFormatter::new();
                sf.begin_dict();
                sf.add_name("Type");
                sf.add_name("XObject");
                sf.add_name("Subtype");
                sf.add_name("Image");
                sf.add_name("Width");
                sf.add_integer(width as i64);
                sf.add_name("Height");
                sf.add_integer(height as i64);
                sf.add_name("ColorSpace");
                sf.add_name("DeviceGray");
                sf.add_name("BitsPerComponent");
                sf.add_integer(8);
                sf.end_dict();
                generator.set_object(
                    smask,
                    PdfObject::Deflate { dict_prefix: strip_trailing_close(sf.steal()), stream: alpha },
                );
            } else if let PdfObject::Placeholder = smask_existing {
                generator.set_object(smask, PdfObject::Placeholder);
            }
        }
    }
    Ok(())
}

fn icc_color_space_name(cs: IccColorSpace) -> &'static str {
    match cs {
        IccColorSpace::Gray => "DeviceGray",
        IccColorSpace::Rgb => "DeviceRGB",
        IccColorSpace::Cmyk => "DeviceCMYK",
        IccColorSpace::Lab => "Lab",
    }
}

// --- pages -------------------------------------------------------------

/// A page's fields the writer needs after it has already released the
/// borrow on `generator.pages()`; everything here is `Clone`.
struct PageSnapshot {
    resource_dict_object: ObjectNumber,
    content_stream_object: ObjectNumber,
    page_object: ObjectNumber,
    media_box: Option<Rect>,
    content: String,
    annotations: Vec<AnnotationId>,
    widgets: Vec<FormWidgetId>,
    structure_parents: Vec<StructureItemId>,
    fonts_used: Vec<FontId>,
    images_used: Vec<ImageId>,
    graphics_states_used: Vec<GraphicsStateId>,
    patterns_used: Vec<PatternId>,
    shadings_used: Vec<ShadingId>,
    forms_used: Vec<FormXObjectId>,
    transparency_groups_used: Vec<TransparencyGroupId>,
    lab_colorspaces_used: Vec<LabColorSpaceId>,
    icc_colorspaces_used: Vec<IccProfileId>,
    separations_used: Vec<(String, crate::color::DeviceFallback)>,
}

fn snapshot_pages(generator: &Generator) -> Vec<PageSnapshot> {
    generator
        .pages()
        .iter()
        .map(|p| PageSnapshot {
            resource_dict_object: p.resource_dict_object,
            content_stream_object: p.content_stream_object,
            page_object: p.page_object,
            media_box: p.media_box.clone(),
            content: p.content.clone(),
            annotations: p.annotations.clone(),
            widgets: p.widgets.clone(),
            structure_parents: p.structure_parents.clone(),
            fonts_used: p.fonts_used.clone(),
            images_used: p.images_used.clone(),
            graphics_states_used: p.graphics_states_used.clone(),
            patterns_used: p.patterns_used.clone(),
            shadings_used: p.shadings_used.clone(),
            forms_used: p.forms_used.clone(),
            transparency_groups_used: p.transparency_groups_used.clone(),
            lab_colorspaces_used: p.lab_colorspaces_used.clone(),
            icc_colorspaces_used: p.icc_colorspaces_used.clone(),
            separations_used: p.separations_used.clone(),
        })
        .collect()
}

fn resolve_pages(generator: &mut Generator, aux: &Aux) -> Result<()> {
    let pages = snapshot_pages(generator);
    for page in &pages {
        let resources_dict = build_resources_dict(generator, aux, page)?;
        generator.set_object(
            page.resource_dict_object,
            PdfObject::Full { dict: resources_dict, stream: None },
        );

        let content_bytes = page.content.as_bytes().to_vec();
        if generator.properties.compress_streams {
            generator.set_object(
                page.content_stream_object,
                PdfObject::Deflate { dict_prefix: String::new(), stream: content_bytes },
            );
        } else {
            generator.set_object(
                page.content_stream_object,
                PdfObject::Full { dict: String::new(), stream: Some(content_bytes) },
            );
        }

        let page_dict = build_page_dict(generator, aux, page)?;
        generator.set_object(page.page_object, PdfObject::Full { dict: page_dict, stream: None });
    }
    Ok(())
}

fn build_resources_dict(generator: &Generator, aux: &Aux, page: &PageSnapshot) -> Result<String> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();

    if !page.fonts_used.is_empty() {
        f.add_name("Font");
        f.begin_dict();
        for id in &page.fonts_used {
            f.add_name(&format!("F{}", id.index()));
            let entry = generator.font_registry_entry(*id)?;
            f.add_object_ref(entry.font_dict_object);
        }
        f.end_dict();
    }

    let mut xobjects: Vec<(String, ObjectNumber)> = Vec::new();
    for id in &page.images_used {
        xobjects.push((format!("Image{}", id.index()), generator.image_registry_entry(*id)?.object_number));
    }
    for id in &page.forms_used {
        xobjects.push((format!("Form{}", id.index()), generator.form_xobject(*id)?.object_number));
    }
    for id in &page.transparency_groups_used {
        xobjects.push((format!("Group{}", id.index()), generator.transparency_group(*id)?.object_number));
    }
    if !xobjects.is_empty() {
        f.add_name("XObject");
        f.begin_dict();
        for (name, obj) in &xobjects {
            f.add_name(name);
            f.add_object_ref(*obj);
        }
        f.end_dict();
    }

    if !page.graphics_states_used.is_empty() {
        f.add_name("ExtGState");
        f.begin_dict();
        for id in &page.graphics_states_used {
            f.add_name(&format!("GS{}", id.index()));
            f.add_object_ref(aux.graphics_states[id.index()]);
        }
        f.end_dict();
    }

    if !page.patterns_used.is_empty() {
        f.add_name("Pattern");
        f.begin_dict();
        for id in &page.patterns_used {
            f.add_name(&format!("P{}", id.index()));
            f.add_object_ref(generator.pattern(*id)?.object_number);
        }
        f.end_dict();
    }

    if !page.shadings_used.is_empty() {
        f.add_name("Shading");
        f.begin_dict();
        for id in &page.shadings_used {
            f.add_name(&format!("Sh{}", id.index()));
            f.add_object_ref(aux.shadings[id.index()]);
        }
        f.end_dict();
    }

    if !page.lab_colorspaces_used.is_empty() || !page.icc_colorspaces_used.is_empty() || !page.separations_used.is_empty()
    {
        f.add_name("ColorSpace");
        f.begin_dict();
        for id in &page.lab_colorspaces_used {
            f.add_name(&format!("CSLab{}", id.index()));
            let lab = generator.lab_colorspace(*id)?;
            write_lab_colorspace_array(&mut f, lab);
        }
        for id in &page.icc_colorspaces_used {
            f.add_name(&format!("CSIcc{}", id.index()));
            f.begin_array(2);
            f.add_name("ICCBased");
            f.add_object_ref(aux.icc_profiles[id.index()]);
            f.end_array();
        }
        for (name, fallback) in &page.separations_used {
            f.add_name(&format!("SepCS_{}", sanitize_separation_name(name)));
            write_separation_array(&mut f, name, fallback);
        }
        f.end_dict();
    }

    f.add_name("ProcSet");
    f.begin_array(8);
    for name in ["PDF", "Text", "ImageB", "ImageC", "ImageI"] {
        f.add_token(&quote_pdf_name(name));
    }
    f.end_array();

    f.end_dict();
    Ok(f.steal())
}

fn write_lab_colorspace_array(f: &mut ObjectFormatter, lab: &LabColorSpaceEntry) {
    f.begin_array(2);
    f.add_name("Lab");
    f.begin_dict();
    f.add_name("WhitePoint");
    f.begin_array(3);
    for v in lab.white_point {
        f.add_double(v as f64);
    }
    f.end_array();
    f.add_name("Range");
    f.begin_array(4);
    for v in lab.range {
        f.add_double(v as f64);
    }
    f.end_array();
    f.end_dict();
    f.end_array();
}

fn write_separation_array(f: &mut ObjectFormatter, name: &str, fallback: &crate::color::DeviceFallback) {
    f.begin_array(4);
    f.add_name("Separation");
    f.add_name(name);
    let (alternate, n) = match fallback {
        crate::color::DeviceFallback::Gray(_) => ("DeviceGray", 1),
        crate::color::DeviceFallback::Rgb(..) => ("DeviceRGB", 3),
        crate::color::DeviceFallback::Cmyk(..) => ("DeviceCMYK", 4),
    };
    f.add_name(alternate);
    // Identity tint transform: a single-sample Type 2 function raising the
    // tint to the 1st power between the fallback's black point and itself.
    f.begin_dict();
    f.add_name("FunctionType");
    f.add_integer(2);
    f.add_name("Domain");
    f.begin_array(2);
    f.add_double(0.0);
    f.add_double(1.0);
    f.end_array();
    f.add_name("C0");
    f.begin_array(4);
    for _ in 0..n {
        f.add_double(1.0);
    }
    f.end_array();
    f.add_name("C1");
    f.begin_array(4);
    let components = match fallback {
        crate::color::DeviceFallback::Gray(g) => vec![*g],
        crate::color::DeviceFallback::Rgb(r, g, b) => vec![*r, *g, *b],
        crate::color::DeviceFallback::Cmyk(c, m, y, k) => vec![*c, *m, *y, *k],
    };
    for v in components {
        f.add_double(v as f64);
    }
    f.end_array();
    f.add_name("N");
    f.add_integer(1);
    f.end_dict();
    f.end_array();
}

fn build_page_dict(generator: &Generator, aux: &Aux, page: &PageSnapshot) -> Result<String> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Page");
    f.add_name("Parent");
    f.add_object_ref(aux.pages_root);
    if let Some(media_box) = &page.media_box {
        f.add_name("MediaBox");
        f.begin_array(4);
        for v in media_box.to_array() {
            f.add_integer(v);
        }
        f.end_array();
    }
    f.add_name("Resources");
    f.add_object_ref(page.resource_dict_object);
    f.add_name("Contents");
    f.add_object_ref(page.content_stream_object);

    let mut annots: Vec<ObjectNumber> = Vec::new();
    for id in &page.annotations {
        annots.push(generator.annotation_entry(*id)?.object_number);
    }
    for id in &page.widgets {
        annots.push(generator.form_widget(*id)?.object_number);
    }
    if !annots.is_empty() {
        f.add_name("Annots");
        f.begin_array(4);
        for obj in annots {
            f.add_object_ref(obj);
        }
        f.end_array();
    }

    if !page.structure_parents.is_empty() {
        f.add_name("StructParents");
        // a page with tagged content is assigned the index of its first
        // structure item as its parent-tree key; the writer builds the
        // matching `/ParentTree` from the same indices.
        f.add_integer(page.structure_parents[0].index() as i64);
    }

    f.end_dict();
    Ok(f.steal())
}

// --- deferred objects ----------------------------------------------------

fn resolve_deferred_objects(generator: &mut Generator, aux: &Aux) -> Result<()> {
    let mut deferred: Vec<(ObjectNumber, DeferredObject)> = Vec::new();
    for (i, obj) in generator.objects().iter().enumerate() {
        if let PdfObject::Deferred(d) = obj {
            deferred.push(((i + 1) as ObjectNumber, *d));
        }
    }

    for (object_number, kind) in deferred {
        let resolved = match kind {
            DeferredObject::SubsetFontData(id) => resolve_font_data(generator, id)?,
            DeferredObject::SubsetFontDescriptor(id) => resolve_font_descriptor(generator, id)?,
            DeferredObject::SubsetFontDict(id) => resolve_font_dict(generator, id)?,
            DeferredObject::SubsetToUnicodeCmap(id) => resolve_tounicode(generator, id)?,
            DeferredObject::PagesRoot => resolve_pages_root(generator, aux)?,
            DeferredObject::CheckboxWidget(id) => resolve_checkbox_widget(generator, id)?,
            DeferredObject::Annotation(id) => resolve_annotation(generator, id)?,
            DeferredObject::StructureItem(id) => resolve_structure_item(generator, id, aux.struct_tree_root)?,
        };
        generator.set_object(object_number, resolved);
    }
    Ok(())
}

fn resolve_pages_root(generator: &Generator, aux: &Aux) -> Result<PdfObject> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Pages");
    f.add_name("Count");
    f.add_integer(generator.pages().len() as i64);
    f.add_name("Kids");
    f.begin_array(4);
    for page in generator.pages() {
        f.add_object_ref(page.page_object);
    }
    f.end_array();
    let _ = aux;
    f.end_dict();
    Ok(PdfObject::Full { dict: f.steal(), stream: None })
}

// --- fonts -----------------------------------------------------------------

fn resolve_font_data(generator: &mut Generator, id: FontId) -> Result<PdfObject> {
    let is_cff = generator.font(id)?.is_cff();
    let bytes = generator.font_mut(id)?.emit_subset()?;

    // `emit_cff_subset` already rewrites the whole CFF (CharStrings,
    // charset, FDSelect/FDArray and the TopDict's offset operands) to
    // match the subset, so the bytes here are a complete, self-contained
    // CFF table ready to embed as-is.
    if is_cff {
        let mut f = ObjectFormatter::new();
        f.begin_dict();
        f.add_name("Subtype");
        f.add_name("Type1C");
        f.end_dict();
        Ok(PdfObject::Deflate { dict_prefix: strip_trailing_close(f.steal()), stream: bytes })
    } else {
        let mut f = ObjectFormatter::new();
        f.begin_dict();
        f.add_name("Length1");
        f.add_integer(bytes.len() as i64);
        f.end_dict();
        Ok(PdfObject::Deflate { dict_prefix: strip_trailing_close(f.steal()), stream: bytes })
    }
}

/// `PdfObject::Deflate`'s `dict_prefix` is an *unclosed* dictionary: the
/// assembler appends `/Length`/`/Filter` and the closing `>>` itself.
/// [`ObjectFormatter::steal`] always emits a fully closed `<< ... >>`, so
/// strip the trailing `>>` line it produced.
fn strip_trailing_close(mut dict: String) -> String {
    if let Some(pos) = dict.rfind(">>") {
        dict.truncate(pos);
    }
    dict
}

fn resolve_font_descriptor(generator: &Generator, id: FontId) -> Result<PdfObject> {
    let entry = generator.font_registry_entry(id)?;
    let parsed = generator.font(id)?;
    let metrics = parsed.metrics();
    let units_per_em = metrics.units_per_em.max(1) as f32;
    let scale = |v: i16| (v as f32 / units_per_em * 1000.0).round() as i64;

    let base_font = subset_tag(id) ;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("FontDescriptor");
    f.add_name("FontName");
    f.add_name(&base_font);

    // This crate always emits Identity-H CID fonts, so Nonsymbolic (bit 5)
    // is set unconditionally rather than inferred from the font's charset.
    let mut flags: i64 = 1 << 5;
    if metrics.fs_selection & 0x01 != 0 {
        flags |= 1 << 6; // Italic
    }
    if metrics.us_weight_class >= 600 {
        flags |= 1 << 18; // ForceBold
    }

    f.add_name("Flags");
    f.add_integer(flags);

    f.add_name("FontBBox");
    f.begin_array(4);
    f.add_integer(scale(metrics.x_min));
    f.add_integer(scale(metrics.y_min));
    f.add_integer(scale(metrics.x_max));
    f.add_integer(scale(metrics.y_max));
    f.end_array();

    f.add_name("ItalicAngle");
    f.add_integer(0);

    f.add_name("Ascent");
    f.add_integer(scale(metrics.get_ascender_unscaled()));
    f.add_name("Descent");
    f.add_integer(scale(metrics.get_descender_unscaled()));
    if let Some(cap) = metrics.s_cap_height {
        f.add_name("CapHeight");
        f.add_integer(scale(cap));
    }
    f.add_name("StemV");
    f.add_integer(if metrics.us_weight_class >= 600 { 120 } else { 80 });

    f.add_name(if parsed.is_cff() { "FontFile3" } else { "FontFile2" });
    f.add_object_ref(entry.font_file_object);

    f.end_dict();
    Ok(PdfObject::Full { dict: f.steal(), stream: None })
}

/// A deterministic 6-uppercase-letter subset tag plus a synthesized
/// PostScript name (`ParsedFont` tracks no original name table entry),
/// matching the `ABCDEF+FontName` convention readers expect for
/// subsetted fonts.
fn subset_tag(id: FontId) -> String {
    let mut letters = [b'A'; 6];
    let mut n = id.index() as u32 + 1;
    for slot in letters.iter_mut() {
        *slot = b'A' + (n % 26) as u8;
        n /= 26;
    }
    format!("{}+Subset", String::from_utf8_lossy(&letters))
}

fn resolve_font_dict(generator: &Generator, id: FontId) -> Result<PdfObject> {
    let entry = generator.font_registry_entry(id)?;
    let parsed = generator.font(id)?;
    let tounicode = generator.font_tounicode_object(id)?;
    let base_font = subset_tag(id);
    let units_per_em = parsed.metrics().units_per_em.max(1) as f32;
    let glyph_count = parsed.subset_glyph_count();

    let mut w_array = ObjectFormatter::new();
    w_array.begin_array(1);
    for gid in 0..glyph_count {
        let advance = (parsed.advance_for_subset_index(gid as u16) as f32 / units_per_em * 1000.0).round() as i64;
        w_array.add_integer(gid as i64);
        w_array.begin_array(1);
        w_array.add_integer(advance);
        w_array.end_array();
    }
    w_array.end_array();
    let w_array_text = w_array.steal();

    let mut descendant = ObjectFormatter::new();
    descendant.begin_dict();
    descendant.add_name("Type");
    descendant.add_name("Font");
    descendant.add_name("Subtype");
    descendant.add_name(if parsed.is_cff() { "CIDFontType0" } else { "CIDFontType2" });
    descendant.add_name("BaseFont");
    descendant.add_name(&base_font);
    descendant.add_name("CIDSystemInfo");
    descendant.begin_dict();
    descendant.add_name("Registry");
    descendant.add_token(&quote_pdf_literal_string(b"Adobe"));
    descendant.add_name("Ordering");
    descendant.add_token(&quote_pdf_literal_string(b"Identity"));
    descendant.add_name("Supplement");
    descendant.add_integer(0);
    descendant.end_dict();
    descendant.add_name("FontDescriptor");
    descendant.add_object_ref(entry.font_descriptor_object);
    descendant.add_name("DW");
    descendant.add_integer(1000);
    descendant.add_name("W");
    descendant.add_token(w_array_text.trim());
    if !parsed.is_cff() {
        descendant.add_name("CIDToGIDMap");
        descendant.add_name("Identity");
    }
    descendant.end_dict();
    let descendant_dict = descendant.steal();

    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Font");
    f.add_name("Subtype");
    f.add_name("Type0");
    f.add_name("BaseFont");
    f.add_name(&base_font);
    f.add_name("Encoding");
    f.add_name("Identity-H");
    f.add_name("DescendantFonts");
    f.begin_array(1);
    // inline, non-indirect descendant font dictionary
    for line in descendant_dict.lines() {
        f.add_token(line.trim());
    }
    f.end_array();
    f.add_name("ToUnicode");
    f.add_object_ref(tounicode);
    f.end_dict();
    Ok(PdfObject::Full { dict: f.steal(), stream: None })
}

fn resolve_tounicode(generator: &Generator, id: FontId) -> Result<PdfObject> {
    let parsed = generator.font(id)?;
    let cmap = parsed.to_unicode_cmap();
    Ok(PdfObject::Deflate { dict_prefix: String::new(), stream: cmap.into_bytes() })
}

// --- annotations / form widgets --------------------------------------------

fn resolve_annotation(generator: &Generator, id: AnnotationId) -> Result<PdfObject> {
    let entry = generator.annotation_entry(id)?;
    match &entry.annotation {
        AnnotationKind::Link(link) => {
            let mut f = ObjectFormatter::new();
            f.begin_dict();
            f.add_name("Type");
            f.add_name("Annot");
            f.add_name("Subtype");
            f.add_name("Link");
            f.add_name("Rect");
            f.begin_array(4);
            for v in link.rect.to_array() {
                f.add_integer(v);
            }
            f.end_array();

            match &link.border {
                BorderArray::Solid(arr) => {
                    f.add_name("Border");
                    f.begin_array(3);
                    for v in arr {
                        f.add_double(*v as f64);
                    }
                    f.end_array();
                }
                BorderArray::Dashed(arr, dash) => {
                    f.add_name("Border");
                    f.begin_array(3);
                    for v in arr {
                        f.add_double(*v as f64);
                    }
                    f.end_array();
                    f.add_name("BS");
                    f.begin_dict();
                    f.add_name("S");
                    f.add_name("D");
                    f.add_name("D");
                    f.begin_array(4);
                    for v in &dash.dash_array {
                        f.add_double(*v as f64);
                    }
                    f.end_array();
                    f.end_dict();
                }
            }

            if !matches!(link.c, ColorArray::Transparent) {
                f.add_name("C");
                f.begin_array(4);
                match link.c {
                    ColorArray::Gray([g]) => f.add_double(g as f64),
                    ColorArray::RGB(rgb) => {
                        for v in rgb {
                            f.add_double(v as f64);
                        }
                    }
                    ColorArray::CMYK(cmyk) => {
                        for v in cmyk {
                            f.add_double(v as f64);
                        }
                    }
                    ColorArray::Transparent => unreachable!(),
                }
                f.end_array();
            }

            f.add_name("H");
            f.add_name(match link.h {
                crate::annotation::HighlightingMode::None => "N",
                crate::annotation::HighlightingMode::Invert => "I",
                crate::annotation::HighlightingMode::Outline => "O",
                crate::annotation::HighlightingMode::Push => "P",
            });

            match &link.a {
                Actions::URI(uri) => {
                    f.add_name("A");
                    f.begin_dict();
                    f.add_name("Type");
                    f.add_name("Action");
                    f.add_name("S");
                    f.add_name("URI");
                    f.add_name("URI");
                    f.add_token(&quote_pdf_literal_string(uri.as_bytes()));
                    f.end_dict();
                }
                Actions::GoTo(Destination::XYZ { page, left, top, zoom }) => {
                    f.add_name("Dest");
                    f.begin_array(5);
                    f.add_integer(*page as i64);
                    f.add_name("XYZ");
                    for v in [left, top] {
                        match v {
                            Some(v) => f.add_double(*v as f64),
                            None => f.add_token("null"),
                        }
                    }
                    match zoom {
                        Some(z) => f.add_double(*z as f64),
                        None => f.add_token("null"),
                    }
                    f.end_array();
                }
            }

            f.end_dict();
            Ok(PdfObject::Full { dict: f.steal(), stream: None })
        }
    }
}

fn resolve_checkbox_widget(generator: &Generator, id: FormWidgetId) -> Result<PdfObject> {
    let widget = generator.form_widget(id)?;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Annot");
    f.add_name("Subtype");
    f.add_name("Widget");
    f.add_name("FT");
    f.add_name("Btn");
    f.add_name("T");
    f.add_token(&quote_pdf_literal_string(widget.name.as_bytes()));
    f.add_name("Rect");
    f.begin_array(4);
    for v in widget.rect.to_array() {
        f.add_integer(v);
    }
    f.end_array();
    f.add_name("V");
    f.add_name(&widget.off_state);
    f.add_name("AS");
    f.add_name(&widget.off_state);

    // No appearance-stream XObjects are registered for checkbox states
    // (`FormWidgetEntry` carries only the on/off state names), so `/AP`
    // is left to the viewer's default rendering rather than pointing at
    // appearance streams that don't exist.
    f.end_dict();
    Ok(PdfObject::Full { dict: f.steal(), stream: None })
}

// --- structure tree ---------------------------------------------------------

fn resolve_structure_item(
    generator: &Generator,
    id: StructureItemId,
    struct_tree_root: Option<ObjectNumber>,
) -> Result<PdfObject> {
    let entry = generator.structure_item(id)?;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("StructElem");
    f.add_name("S");
    f.add_name(&entry.type_or_role);
    match entry.parent {
        Some(parent) => {
            f.add_name("P");
            f.add_object_ref(generator.structure_item(parent)?.object_number);
        }
        None => {
            // Root-level items reference `/StructTreeRoot` as their `/P`;
            // `allocate_auxiliary_objects` always allocates it before
            // deferred-object resolution runs whenever any structure item
            // exists, so this is always `Some` here.
            if let Some(root) = struct_tree_root {
                f.add_name("P");
                f.add_object_ref(root);
            }
        }
    }
    if !entry.children.is_empty() {
        f.add_name("K");
        f.begin_array(4);
        for child in &entry.children {
            f.add_object_ref(generator.structure_item(*child)?.object_number);
        }
        f.end_array();
    } else {
        f.add_name("K");
        f.add_integer(id.index() as i64);
    }
    f.end_dict();
    Ok(PdfObject::Full { dict: f.steal(), stream: None })
}

// --- graphics states / functions / shadings / patterns / forms / groups ---

fn resolve_auxiliary_objects(generator: &mut Generator, aux: &Aux) -> Result<()> {
    for i in 0..generator.graphics_state_len() {
        let id = GraphicsStateId::from_index(i);
        let state = generator.graphics_state(id)?;
        let font_obj = state_font_object(generator, state)?;
        let dict = extgstate_to_dict(state, font_obj);
        generator.set_object(aux.graphics_states[i], PdfObject::Full { dict, stream: None });
    }

    for i in 0..generator.function_len() {
        let dict = build_function_dict(generator, FunctionId::from_index(i), aux)?;
        generator.set_object(aux.functions[i], PdfObject::Full { dict, stream: None });
    }

    for i in 0..generator.shading_len() {
        let (dict, stream) = build_shading_dict(generator, ShadingId::from_index(i), aux)?;
        match stream {
            Some(stream) => generator.set_object(
                aux.shadings[i],
                PdfObject::Deflate { dict_prefix: strip_trailing_close(dict), stream },
            ),
            None => generator.set_object(aux.shadings[i], PdfObject::Full { dict, stream: None }),
        }
    }

    for i in 0..generator.icc_profile_len() {
        let profile = generator.icc_profile(IccProfileId::from_index(i))?;
        let dict = icc_stream_dict_prefix(profile);
        generator.set_object(
            aux.icc_profiles[i],
            PdfObject::Deflate { dict_prefix: dict, stream: profile.data.clone() },
        );
    }

    for i in 0..generator.pattern_len() {
        let dict = build_pattern_object(generator, PatternId::from_index(i), aux)?;
        generator.set_object(generator.pattern(PatternId::from_index(i))?.object_number, dict);
    }

    for i in 0..generator.form_xobject_len() {
        let entry = generator.form_xobject(FormXObjectId::from_index(i))?;
        let dict = build_form_xobject_dict(entry);
        generator.set_object(
            entry.object_number,
            PdfObject::Deflate { dict_prefix: dict, stream: entry.content.clone().into_bytes() },
        );
    }

    for i in 0..generator.transparency_group_len() {
        let entry = generator.transparency_group(TransparencyGroupId::from_index(i))?;
        let dict = build_transparency_group_dict(entry);
        generator.set_object(
            entry.object_number,
            PdfObject::Deflate { dict_prefix: dict, stream: entry.content.clone().into_bytes() },
        );
    }

    for i in 0..generator.outline_len() {
        let dict = build_outline_dict(generator, OutlineId::from_index(i))?;
        let object_number = generator.outlines()[i].object_number;
        generator.set_object(object_number, PdfObject::Full { dict, stream: None });
    }

    for i in 0..generator.optional_content_group_len() {
        let dict = build_ocg_dict(generator, OptionalContentGroupId::from_index(i))?;
        let object_number = generator.optional_content_group(OptionalContentGroupId::from_index(i))?.object_number;
        generator.set_object(object_number, PdfObject::Full { dict, stream: None });
    }

    for i in 0..generator.embedded_file_len() {
        let entry = generator.embedded_file(EmbeddedFileId::from_index(i))?;
        let dict = build_embedded_file_dict(entry);
        generator.set_object(
            entry.object_number,
            PdfObject::Deflate { dict_prefix: dict, stream: entry.data.clone() },
        );
    }

    if let Some(root) = aux.struct_tree_root {
        let dict = build_struct_tree_root(generator, root)?;
        generator.set_object(root, PdfObject::Full { dict, stream: None });
    }

    if let Some(acro) = aux.acro_form {
        let dict = build_acro_form(generator)?;
        generator.set_object(acro, PdfObject::Full { dict, stream: None });
    }

    if let Some(intent) = aux.output_intent {
        let dict = build_output_intent(generator, aux)?;
        generator.set_object(intent, PdfObject::Full { dict, stream: None });
    }

    if let Some(metadata) = aux.metadata {
        let xmp = build_xmp_metadata(generator);
        generator.set_object(
            metadata,
            PdfObject::Deflate {
                dict_prefix: xmp_dict_prefix(),
                stream: xmp.into_bytes(),
            },
        );
    }

    if let Some(names) = aux.embedded_files_names {
        let dict = build_embedded_files_name_tree(generator)?;
        generator.set_object(names, PdfObject::Full { dict, stream: None });
    }

    Ok(())
}

fn state_font_object(generator: &Generator, state: &crate::graphics::ExtendedGraphicsState) -> Result<Option<u32>> {
    match state.font() {
        Some(font_id) => {
            let entry = generator.font_registry_entry(*font_id)?;
            Ok(Some(entry.font_dict_object))
        }
        None => Ok(None),
    }
}

fn build_function_dict(generator: &Generator, id: FunctionId, _aux: &Aux) -> Result<String> {
    let func = generator.function(id)?;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    match func {
        FunctionEntry::Type2 { domain, c0, c1, exponent } => {
            f.add_name("FunctionType");
            f.add_integer(2);
            f.add_name("Domain");
            f.begin_array(2);
            f.add_double(domain[0] as f64);
            f.add_double(domain[1] as f64);
            f.end_array();
            f.add_name("C0");
            f.begin_array(4);
            for v in c0 {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.add_name("C1");
            f.begin_array(4);
            for v in c1 {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.add_name("N");
            f.add_double(*exponent as f64);
        }
        FunctionEntry::Type3 { domain, functions, bounds, encode } => {
            f.add_name("FunctionType");
            f.add_integer(3);
            f.add_name("Domain");
            f.begin_array(2);
            f.add_double(domain[0] as f64);
            f.add_double(domain[1] as f64);
            f.end_array();
            f.add_name("Functions");
            f.begin_array(4);
            for sub in functions {
                f.add_object_ref(_aux.functions[sub.index()]);
            }
            f.end_array();
            f.add_name("Bounds");
            f.begin_array(4);
            for v in bounds {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.add_name("Encode");
            f.begin_array(4);
            for v in encode {
                f.add_double(*v as f64);
            }
            f.end_array();
        }
    }
    f.end_dict();
    Ok(f.steal())
}

fn build_shading_dict(generator: &Generator, id: ShadingId, aux: &Aux) -> Result<(String, Option<Vec<u8>>)> {
    let shading = generator.shading(id)?;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("ColorSpace");
    f.add_name("DeviceRGB");
    match shading {
        ShadingEntry::Axial { coords, function, extend } => {
            f.add_name("ShadingType");
            f.add_integer(2);
            f.add_name("Coords");
            f.begin_array(4);
            for v in coords {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.add_name("Function");
            f.add_object_ref(aux.functions[function.index()]);
            f.add_name("Extend");
            f.begin_array(2);
            f.add_bool(extend.0);
            f.add_bool(extend.1);
            f.end_array();
        }
        ShadingEntry::Radial { coords, function, extend } => {
            f.add_name("ShadingType");
            f.add_integer(3);
            f.add_name("Coords");
            f.begin_array(6);
            for v in coords {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.add_name("Function");
            f.add_object_ref(aux.functions[function.index()]);
            f.add_name("Extend");
            f.begin_array(2);
            f.add_bool(extend.0);
            f.add_bool(extend.1);
            f.end_array();
        }
        ShadingEntry::GouraudTriangleMesh { bits_per_coordinate, bits_per_component, decode, vertices } => {
            f.add_name("ShadingType");
            f.add_integer(4);
            f.add_name("BitsPerCoordinate");
            f.add_integer(*bits_per_coordinate as i64);
            f.add_name("BitsPerComponent");
            f.add_integer(*bits_per_component as i64);
            f.add_name("BitsPerFlag");
            f.add_integer(8);
            f.add_name("Decode");
            f.begin_array(8);
            for v in decode {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.end_dict();
            let stream = pack_gouraud_vertices(vertices, *bits_per_coordinate, *bits_per_component, decode);
            return Ok((f.steal(), Some(stream)));
        }
        ShadingEntry::TensorPatchMesh { bits_per_coordinate, bits_per_component, decode, patches } => {
            f.add_name("ShadingType");
            f.add_integer(6);
            f.add_name("BitsPerCoordinate");
            f.add_integer(*bits_per_coordinate as i64);
            f.add_name("BitsPerComponent");
            f.add_integer(*bits_per_component as i64);
            f.add_name("BitsPerFlag");
            f.add_integer(8);
            f.add_name("Decode");
            f.begin_array(8);
            for v in decode {
                f.add_double(*v as f64);
            }
            f.end_array();
            f.end_dict();
            let stream = pack_tensor_patches(patches, *bits_per_coordinate, *bits_per_component, decode);
            return Ok((f.steal(), Some(stream)));
        }
    }
    f.end_dict();
    Ok((f.steal(), None))
}

/// Bit-level writer for the packed vertex/patch streams that back type 4/6
/// shadings. Each vertex or patch starts on a byte boundary per the stream
/// encoding rules for those shading types.
struct BitWriter {
    buf: Vec<u8>,
    acc: u32,
    nbits: u8,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter { buf: Vec::new(), acc: 0, nbits: 0 }
    }

    fn write_bits(&mut self, value: u64, bits: u8) {
        let mut remaining = bits;
        while remaining > 0 {
            let take = remaining.min(8 - self.nbits);
            let shift = remaining - take;
            let chunk = ((value >> shift) & ((1u64 << take) - 1)) as u32;
            self.acc = (self.acc << take) | chunk;
            self.nbits += take;
            remaining -= take;
            if self.nbits == 8 {
                self.buf.push(self.acc as u8);
                self.acc = 0;
                self.nbits = 0;
            }
        }
    }

    fn align_byte(&mut self) {
        if self.nbits > 0 {
            self.acc <<= 8 - self.nbits;
            self.buf.push(self.acc as u8);
            self.acc = 0;
            self.nbits = 0;
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Maps `value` from `[dmin, dmax]` onto the unsigned integer range
/// representable in `bits`, per the `Decode` array semantics shared by
/// all packed-sample PDF stream encodings.
fn encode_sample(value: f32, dmin: f32, dmax: f32, bits: u8) -> u64 {
    let max_int = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    if dmax <= dmin {
        return 0;
    }
    let t = ((value - dmin) / (dmax - dmin)).clamp(0.0, 1.0);
    (t as f64 * max_int as f64).round() as u64
}

fn pack_gouraud_vertices(vertices: &[GouraudVertex], bpc: u8, bpcomp: u8, decode: &[f32]) -> Vec<u8> {
    let ncomp = decode.len().saturating_sub(4) / 2;
    let mut w = BitWriter::new();
    for v in vertices {
        w.write_bits(v.edge_flag as u64, 8);
        w.write_bits(encode_sample(v.x, decode[0], decode[1], bpc), bpc);
        w.write_bits(encode_sample(v.y, decode[2], decode[3], bpc), bpc);
        for c in 0..ncomp {
            let dmin = decode[4 + c * 2];
            let dmax = decode[4 + c * 2 + 1];
            w.write_bits(encode_sample(v.color[c], dmin, dmax, bpcomp), bpcomp);
        }
        w.align_byte();
    }
    w.finish()
}

fn pack_tensor_patches(patches: &[TensorPatch], bpc: u8, bpcomp: u8, decode: &[f32]) -> Vec<u8> {
    let ncomp = decode.len().saturating_sub(4) / 2;
    let mut w = BitWriter::new();
    for p in patches {
        w.write_bits(p.edge_flag as u64, 8);
        for (x, y) in &p.points {
            w.write_bits(encode_sample(*x, decode[0], decode[1], bpc), bpc);
            w.write_bits(encode_sample(*y, decode[2], decode[3], bpc), bpc);
        }
        for color in &p.colors {
            for c in 0..ncomp {
                let dmin = decode[4 + c * 2];
                let dmax = decode[4 + c * 2 + 1];
                w.write_bits(encode_sample(color[c], dmin, dmax, bpcomp), bpcomp);
            }
        }
        w.align_byte();
    }
    w.finish()
}

fn icc_stream_dict_prefix(profile: &IccProfile) -> String {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("N");
    f.add_integer(profile.color_space.channel_count() as i64);
    let alternate = match profile.color_space {
        IccColorSpace::Gray => "DeviceGray",
        IccColorSpace::Rgb => "DeviceRGB",
        IccColorSpace::Cmyk => "DeviceCMYK",
        IccColorSpace::Lab => "Lab",
    };
    f.add_name("Alternate");
    f.add_name(alternate);
    f.end_dict();
    strip_trailing_close(f.steal())
}

fn build_pattern_object(generator: &Generator, id: PatternId, aux: &Aux) -> Result<PdfObject> {
    let entry = generator.pattern(id)?;
    match &entry.kind {
        PatternKind::Shading(shading_id) => {
            let mut f = ObjectFormatter::new();
            f.begin_dict();
            f.add_name("Type");
            f.add_name("Pattern");
            f.add_name("PatternType");
            f.add_integer(2);
            f.add_name("Shading");
            f.add_object_ref(aux.shadings[shading_id.index()]);
            f.add_name("Matrix");
            f.begin_array(6);
            for v in entry.matrix {
                f.add_double(v as f64);
            }
            f.end_array();
            f.end_dict();
            Ok(PdfObject::Full { dict: f.steal(), stream: None })
        }
        PatternKind::Tiling { content, bbox, x_step, y_step } => {
            let mut f = ObjectFormatter::new();
            f.begin_dict();
            f.add_name("Type");
            f.add_name("Pattern");
            f.add_name("PatternType");
            f.add_integer(1);
            f.add_name("PaintType");
            f.add_integer(1);
            f.add_name("TilingType");
            f.add_integer(1);
            f.add_name("BBox");
            f.begin_array(4);
            for v in bbox.to_array() {
                f.add_integer(v);
            }
            f.end_array();
            f.add_name("XStep");
            f.add_double(*x_step as f64);
            f.add_name("YStep");
            f.add_double(*y_step as f64);
            f.add_name("Matrix");
            f.begin_array(6);
            for v in entry.matrix {
                f.add_double(v as f64);
            }
            f.end_array();
            f.add_name("Resources");
            f.begin_dict();
            f.end_dict();
            let dict = strip_trailing_close(f.steal());
            Ok(PdfObject::Deflate { dict_prefix: dict, stream: content.clone().into_bytes() })
        }
    }
}

fn build_form_xobject_dict(entry: &FormXObjectEntry) -> String {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("XObject");
    f.add_name("Subtype");
    f.add_name("Form");
    f.add_name("FormType");
    f.add_integer(1);
    f.add_name("BBox");
    f.begin_array(4);
    for v in entry.bbox.to_array() {
        f.add_integer(v);
    }
    f.end_array();
    f.add_name("Matrix");
    f.begin_array(6);
    for v in entry.matrix {
        f.add_double(v as f64);
    }
    f.end_array();
    f.add_name("Resources");
    f.begin_dict();
    f.end_dict();
    strip_trailing_close(f.steal())
}

fn build_transparency_group_dict(entry: &TransparencyGroupEntry) -> String {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("XObject");
    f.add_name("Subtype");
    f.add_name("Form");
    f.add_name("FormType");
    f.add_integer(1);
    f.add_name("BBox");
    f.begin_array(4);
    for v in entry.bbox.to_array() {
        f.add_integer(v);
    }
    f.end_array();
    f.add_name("Group");
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Group");
    f.add_name("S");
    f.add_name("Transparency");
    f.add_name("I");
    f.add_bool(entry.isolated);
    f.add_name("K");
    f.add_bool(entry.knockout);
    if let Some(cs) = entry.color_space {
        f.add_name("CS");
        f.add_name(match cs {
            IccColorSpace::Gray => "DeviceGray",
            IccColorSpace::Rgb => "DeviceRGB",
            IccColorSpace::Cmyk => "DeviceCMYK",
            IccColorSpace::Lab => "Lab",
        });
    }
    f.end_dict();
    f.add_name("Resources");
    f.begin_dict();
    f.end_dict();
    strip_trailing_close(f.steal())
}

fn build_outline_dict(generator: &Generator, id: OutlineId) -> Result<String> {
    let outlines = generator.outlines();
    let entry = &outlines[id.index()];
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Title");
    f.add_token(&quote_pdf_literal_string(entry.title.as_bytes()));
    match entry.parent {
        Some(parent) => {
            f.add_name("Parent");
            f.add_object_ref(outlines[parent.index()].object_number);
        }
        None => {}
    }
    if !entry.children.is_empty() {
        f.add_name("First");
        f.add_object_ref(outlines[entry.children[0].index()].object_number);
        f.add_name("Last");
        f.add_object_ref(outlines[entry.children[entry.children.len() - 1].index()].object_number);
        f.add_name("Count");
        f.add_integer(entry.children.len() as i64);
    }
    let siblings: Vec<OutlineId> = match entry.parent {
        Some(parent) => outlines[parent.index()].children.clone(),
        None => (0..outlines.len())
            .filter(|&i| outlines[i].parent.is_none())
            .map(OutlineId::from_index)
            .collect(),
    };
    if let Some(pos) = siblings.iter().position(|c| *c == id) {
        if pos > 0 {
            f.add_name("Prev");
            f.add_object_ref(outlines[siblings[pos - 1].index()].object_number);
        }
        if pos + 1 < siblings.len() {
            f.add_name("Next");
            f.add_object_ref(outlines[siblings[pos + 1].index()].object_number);
        }
    }
    if let Some(page_index) = entry.dest_page {
        f.add_name("Dest");
        f.begin_array(5);
        f.add_integer(page_index as i64);
        f.add_name("XYZ");
        f.add_token("null");
        f.add_token("null");
        f.add_token("null");
        f.end_array();
    }
    let _ = generator;
    f.end_dict();
    Ok(f.steal())
}

fn build_ocg_dict(generator: &Generator, id: OptionalContentGroupId) -> Result<String> {
    let entry = generator.optional_content_group(id)?;
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("OCG");
    f.add_name("Name");
    f.add_token(&quote_pdf_literal_string(entry.name.as_bytes()));
    if !entry.intent.is_empty() {
        f.add_name("Intent");
        f.begin_array(2);
        for intent in &entry.intent {
            f.add_name(match intent {
                OcgIntent::View => "View",
                OcgIntent::Design => "Design",
            });
        }
        f.end_array();
    }
    f.end_dict();
    Ok(f.steal())
}

fn build_embedded_file_dict(entry: &EmbeddedFileEntry) -> String {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("EmbeddedFile");
    f.add_name("Subtype");
    f.add_name(&entry.mime_type.replace('/', "#2F"));
    f.add_name("Params");
    f.begin_dict();
    f.add_name("Size");
    f.add_integer(entry.data.len() as i64);
    f.end_dict();
    f.end_dict();
    strip_trailing_close(f.steal())
}

fn build_embedded_files_name_tree(generator: &Generator) -> Result<String> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Names");
    f.begin_array(2);
    for i in 0..generator.embedded_file_len() {
        let entry = generator.embedded_file(EmbeddedFileId::from_index(i))?;
        f.add_token(&quote_pdf_literal_string(entry.name.as_bytes()));
        f.begin_dict();
        f.add_name("Type");
        f.add_name("Filespec");
        f.add_name("F");
        f.add_token(&quote_pdf_literal_string(entry.name.as_bytes()));
        f.add_name("EF");
        f.begin_dict();
        f.add_name("F");
        f.add_object_ref(entry.object_number);
        f.end_dict();
        f.end_dict();
    }
    f.end_array();
    f.end_dict();
    Ok(f.steal())
}

fn build_struct_tree_root(generator: &Generator, root: ObjectNumber) -> Result<String> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("StructTreeRoot");
    f.add_name("K");
    f.begin_array(4);
    for i in 0..generator.structure_item_len() {
        let entry = generator.structure_item(StructureItemId::from_index(i))?;
        if entry.parent.is_none() {
            f.add_object_ref(entry.object_number);
        }
    }
    f.end_array();
    if !generator.rolemap().is_empty() {
        f.add_name("RoleMap");
        f.begin_dict();
        for (custom, standard) in generator.rolemap() {
            f.add_name(custom);
            f.add_name(standard);
        }
        f.end_dict();
    }
    let _ = root;
    f.end_dict();
    Ok(f.steal())
}

fn build_acro_form(generator: &Generator) -> Result<String> {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Fields");
    f.begin_array(4);
    for i in 0..generator.form_widget_len() {
        let entry = generator.form_widget(FormWidgetId::from_index(i))?;
        f.add_object_ref(entry.object_number);
    }
    f.end_array();
    f.add_name("NeedAppearances");
    f.add_bool(false);
    f.end_dict();
    Ok(f.steal())
}

fn build_output_intent(generator: &Generator, aux: &Aux) -> Result<String> {
    let target_cs = generator.properties.output_color_space;
    let profile_ref = (0..generator.icc_profile_len())
        .find(|&i| generator.icc_profile(IccProfileId::from_index(i)).map(|p| p.color_space == target_cs).unwrap_or(false))
        .map(|i| aux.icc_profiles[i]);

    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("OutputIntent");
    f.add_name("S");
    f.add_name(if generator.properties.conformance.get_identifier_string().starts_with("PDF/X") {
        "GTS_PDFX"
    } else {
        "GTS_PDFA1"
    });
    f.add_name("OutputConditionIdentifier");
    f.add_token(&quote_pdf_literal_string(b"Custom"));
    if let Some(profile) = profile_ref {
        f.add_name("DestOutputProfile");
        f.add_object_ref(profile);
    }
    f.end_dict();
    Ok(f.steal())
}

fn xmp_dict_prefix() -> String {
    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Metadata");
    f.add_name("Subtype");
    f.add_name("XML");
    strip_trailing_close(f.steal())
}

fn build_xmp_metadata(generator: &Generator) -> String {
    let now = date::generation_timestamp();
    let date_str = utils::to_pdf_xmp_date(&now);
    format!(
        "<?xpacket begin=\"﻿\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n\
<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n\
 <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n\
  <rdf:Description rdf:about=\"\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n\
   <dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{title}</rdf:li></rdf:Alt></dc:title>\n\
   <dc:creator><rdf:Seq><rdf:li>{author}</rdf:li></rdf:Seq></dc:creator>\n\
  </rdf:Description>\n\
  <rdf:Description rdf:about=\"\" xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\">\n\
   <xmp:CreateDate>{date}</xmp:CreateDate>\n\
   <xmp:CreatorTool>{creator}</xmp:CreatorTool>\n\
  </rdf:Description>\n\
  <rdf:Description rdf:about=\"\" xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\">\n\
   <pdf:Producer>{producer}</pdf:Producer>\n\
  </rdf:Description>\n\
 </rdf:RDF>\n\
</x:xmpmeta>\n\
<?xpacket end=\"w\"?>",
        title = xml_escape(&generator.properties.title),
        author = xml_escape(&generator.properties.author),
        creator = xml_escape(&generator.properties.creator),
        producer = xml_escape(&generator.properties.producer),
        date = date_str,
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

// --- catalog / document info ------------------------------------------------

fn build_catalog(generator: &mut Generator, aux: &Aux) -> Result<ObjectNumber> {
    let catalog_object = generator.allocate_object();

    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Type");
    f.add_name("Catalog");
    f.add_name("Pages");
    f.add_object_ref(aux.pages_root);

    if !generator.outlines().is_empty() {
        let first = generator
            .outlines()
            .iter()
            .position(|o| o.parent.is_none())
            .map(|i| generator.outlines()[i].object_number);
        let last = generator
            .outlines()
            .iter()
            .enumerate()
            .filter(|(_, o)| o.parent.is_none())
            .last()
            .map(|(_, o)| o.object_number);
        if let (Some(first), Some(last)) = (first, last) {
            f.add_name("Outlines");
            f.begin_dict();
            f.add_name("Type");
            f.add_name("Outlines");
            f.add_name("First");
            f.add_object_ref(first);
            f.add_name("Last");
            f.add_object_ref(last);
            f.end_dict();
        }
    }

    if let Some(root) = aux.struct_tree_root {
        f.add_name("StructTreeRoot");
        f.add_object_ref(root);
        f.add_name("MarkInfo");
        f.begin_dict();
        f.add_name("Marked");
        f.add_bool(true);
        f.end_dict();
    }

    if let Some(acro) = aux.acro_form {
        f.add_name("AcroForm");
        f.add_object_ref(acro);
    }

    if let Some(intent) = aux.output_intent {
        f.add_name("OutputIntents");
        f.begin_array(1);
        f.add_object_ref(intent);
        f.end_array();
    }

    if let Some(metadata) = aux.metadata {
        f.add_name("Metadata");
        f.add_object_ref(metadata);
    }

    if generator.optional_content_group_len() > 0 {
        f.add_name("OCProperties");
        f.begin_dict();
        f.add_name("OCGs");
        f.begin_array(4);
        for i in 0..generator.optional_content_group_len() {
            f.add_object_ref(generator.optional_content_group(OptionalContentGroupId::from_index(i))?.object_number);
        }
        f.end_array();
        f.add_name("D");
        f.begin_dict();
        f.add_name("Order");
        f.begin_array(4);
        for i in 0..generator.optional_content_group_len() {
            f.add_object_ref(generator.optional_content_group(OptionalContentGroupId::from_index(i))?.object_number);
        }
        f.end_array();
        f.end_dict();
        f.end_dict();
    }

    if let Some(names) = aux.embedded_files_names {
        f.add_name("Names");
        f.begin_dict();
        f.add_name("EmbeddedFiles");
        f.add_object_ref(names);
        f.end_dict();
    }

    f.add_name("Lang");
    f.add_token(&quote_pdf_literal_string(generator.properties.language.as_bytes()));

    f.end_dict();
    generator.set_object(catalog_object, PdfObject::Full { dict: f.steal(), stream: None });
    Ok(catalog_object)
}

fn build_document_info(generator: &mut Generator, _aux: &Aux) -> Result<ObjectNumber> {
    let info_object = generator.allocate_object();
    let now = date::generation_timestamp();
    let stamp = utils::to_pdf_time_stamp_metadata(&now);

    let mut f = ObjectFormatter::new();
    f.begin_dict();
    f.add_name("Title");
    f.add_token(&quote_pdf_literal_string(generator.properties.title.as_bytes()));
    f.add_name("Author");
    f.add_token(&quote_pdf_literal_string(generator.properties.author.as_bytes()));
    f.add_name("Creator");
    f.add_token(&quote_pdf_literal_string(generator.properties.creator.as_bytes()));
    f.add_name("Producer");
    f.add_token(&quote_pdf_literal_string(generator.properties.producer.as_bytes()));
    f.add_name("CreationDate");
    f.add_token(&quote_pdf_literal_string(stamp.as_bytes()));
    f.add_name("ModDate");
    f.add_token(&quote_pdf_literal_string(stamp.as_bytes()));
    f.end_dict();

    generator.set_object(info_object, PdfObject::Full { dict: f.steal(), stream: None });
    Ok(info_object)
}

// --- byte assembly -----------------------------------------------------------

/// Serializes an object entry's dictionary/stream into the
/// `N 0 obj ... endobj` form, handling the three registry-entry variants
/// plus applying deflate compression where `compress_streams` is set.
fn serialize_object(number: ObjectNumber, obj: &PdfObject, compress: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());

    match obj {
        PdfObject::Placeholder => {
            out.extend_from_slice(b"<<\n>>\n");
        }
        PdfObject::Full { dict, stream } => match stream {
            Some(stream) => write_stream(&mut out, dict, stream, false)?,
            None => out.extend_from_slice(dict.as_bytes()),
        },
        PdfObject::Deflate { dict_prefix, stream } => {
            write_stream(&mut out, dict_prefix, stream, compress)?;
        }
        PdfObject::Deferred(_) => unreachable!("deferred object left unresolved at write time"),
    }

    out.extend_from_slice(b"endobj\n");
    Ok(out)
}

/// Appends `/Length`/`/Filter` plus the closing `>>` and `stream`/
/// `endstream` pair to an already-open (unclosed) dictionary prefix.
/// When `obj` is `PdfObject::Full` with its own stream, `dict` is the
/// *already-closed* dictionary text emitted by the resolver — so this
/// helper is shared by both paths, detecting whether `dict` still ends
/// in a dict-open state by checking for a trailing `>>`.
fn write_stream(out: &mut Vec<u8>, dict_prefix_or_full: &str, raw: &[u8], compress: bool) -> Result<()> {
    let (payload, filter) = if compress {
        (deflate(raw)?, Some("FlateDecode"))
    } else {
        (raw.to_vec(), None)
    };

    let already_closed = dict_prefix_or_full.trim_end().ends_with(">>");
    if already_closed {
        let body = dict_prefix_or_full.trim_end();
        out.extend_from_slice(&body[..body.len() - 2].as_bytes());
    } else {
        out.extend_from_slice(dict_prefix_or_full.as_bytes());
    }

    out.extend_from_slice(format!("  /Length {}\n", payload.len()).as_bytes());
    if let Some(filter) = filter {
        out.extend_from_slice(format!("  /Filter /{filter}\n").as_bytes());
    }
    out.extend_from_slice(b">>\nstream\n");
    out.extend_from_slice(&payload);
    if !payload.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b"endstream\n");
    Ok(())
}

fn assemble(generator: &Generator, catalog_object: ObjectNumber, info_object: ObjectNumber) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("%PDF-{}\n", generator.properties.conformance.pdf_version_string()).as_bytes());
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets: HashMap<ObjectNumber, usize> = HashMap::new();
    let compress = generator.properties.compress_streams;

    for (i, obj) in generator.objects().iter().enumerate() {
        let number = (i + 1) as ObjectNumber;
        offsets.insert(number, out.len());
        out.extend_from_slice(&serialize_object(number, obj, compress)?);
    }

    let xref_offset = out.len();
    let object_count = generator.object_count() as u32 + 1;
    out.extend_from_slice(b"xref\n");
    out.extend_from_slice(format!("0 {object_count}\n").as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for number in 1..object_count {
        let offset = offsets.get(&number).copied().unwrap_or(0);
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }

    out.extend_from_slice(b"trailer\n");
    let mut trailer = ObjectFormatter::new();
    trailer.begin_dict();
    trailer.add_name("Size");
    trailer.add_integer(object_count as i64);
    trailer.add_name("Root");
    trailer.add_object_ref(catalog_object);
    trailer.add_name("Info");
    trailer.add_object_ref(info_object);

    let (id_a, id_b) = if date::reproducible_build_requested() {
        let seed = date::generation_timestamp();
        let id = utils::deterministic_id_string(&seed);
        (id.clone(), id)
    } else {
        let id = utils::random_character_string_32();
        (id.clone(), id)
    };
    trailer.add_name("ID");
    trailer.begin_array(2);
    trailer.add_token(&hexstring(id_a.as_bytes()));
    trailer.add_token(&hexstring(id_b.as_bytes()));
    trailer.end_array();
    trailer.end_dict();
    out.extend_from_slice(trailer.steal().as_bytes());

    out.extend_from_slice(b"startxref\n");
    out.extend_from_slice(format!("{xref_offset}\n").as_bytes());
    out.extend_from_slice(b"%%EOF\n");

    Ok(out)
}
