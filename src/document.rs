//! The document object model: typed resource registries, object number
//! assignment, and the high-level resource-registration operations
//! (`load_font`, `add_image`, `add_shading`, …). This is the generator
//! the rest of the crate builds against; the writer (not this module)
//! turns it into bytes.

use crate::annotation::LinkAnnotation;
use crate::conformance::PdfConformance;
use crate::errors::{Error, Result};
use crate::font::ParsedFont;
use crate::graphics::{ExtendedGraphicsState, Rect};
use crate::icc::{ColorConverter, IccColorSpace, IccProfile};
use crate::units::Mm;

macro_rules! typed_id {
    ($name:ident) => {
        /// Opaque handle: a distinct wrapper around an integer index into
        /// the generator's corresponding registry. Not interchangeable
        /// with any other handle type, even though the underlying index
        /// spaces are all `usize`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                $name(index)
            }

            pub fn index(&self) -> usize {
                self.0
            }
        }
    };
}

typed_id!(FontId);
typed_id!(ImageId);
typed_id!(LabColorSpaceId);
typed_id!(IccProfileId);
typed_id!(PatternId);
typed_id!(AnnotationId);
typed_id!(StructureItemId);
typed_id!(GraphicsStateId);
typed_id!(FunctionId);
typed_id!(ShadingId);
typed_id!(TransparencyGroupId);
typed_id!(OutlineId);
typed_id!(FormWidgetId);
typed_id!(OptionalContentGroupId);
typed_id!(EmbeddedFileId);
typed_id!(FormXObjectId);

/// A PDF object number: a positive, densely-assigned 32-bit integer.
/// Index 0 is reserved for the free-list head, so the first object
/// registered gets number 1.
pub type ObjectNumber = u32;

/// One entry in the generator's object registry.
pub enum PdfObject {
    /// Slot reserved (object number allocated) but not yet filled in.
    Placeholder,
    /// A fully serialized dictionary, optionally with a binary stream
    /// already attached.
    Full {
        dict: String,
        stream: Option<Vec<u8>>,
    },
    /// An unclosed dictionary prefix plus a raw stream; the writer
    /// deflates the stream, inserts `/Length`/`/Filter`, and closes the
    /// dictionary at write time.
    Deflate { dict_prefix: String, stream: Vec<u8> },
    /// An object whose final form depends on other registries and is
    /// synthesized during the write phase.
    Deferred(DeferredObject),
}

/// Object kinds whose serialization can only happen once every other
/// registry is complete, because at registration time we only know an
/// object's *number*, not its final content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredObject {
    SubsetFontData(FontId),
    SubsetFontDescriptor(FontId),
    SubsetToUnicodeCmap(FontId),
    SubsetFontDict(FontId),
    PagesRoot,
    CheckboxWidget(FormWidgetId),
    Annotation(AnnotationId),
    StructureItem(StructureItemId),
}

/// One page: the triple of object numbers a page owns, plus the
/// bookkeeping the writer needs to materialize its `/Page` dictionary.
pub struct Page {
    pub resource_dict_object: ObjectNumber,
    pub content_stream_object: ObjectNumber,
    pub page_object: ObjectNumber,
    pub media_box: Option<Rect>,
    /// The page's content stream body (raw PDF operators), set once the
    /// caller has built it through a [`crate::draw::DrawContext`] and
    /// called [`crate::draw::DrawContext::serialize`]. Left empty for a
    /// blank page.
    pub content: String,
    pub annotations: Vec<AnnotationId>,
    pub widgets: Vec<FormWidgetId>,
    pub structure_parents: Vec<StructureItemId>,
    pub fonts_used: Vec<FontId>,
    pub images_used: Vec<ImageId>,
    pub graphics_states_used: Vec<GraphicsStateId>,
    pub patterns_used: Vec<PatternId>,
    pub shadings_used: Vec<ShadingId>,
    pub forms_used: Vec<FormXObjectId>,
    pub transparency_groups_used: Vec<TransparencyGroupId>,
    pub lab_colorspaces_used: Vec<LabColorSpaceId>,
    pub icc_colorspaces_used: Vec<IccProfileId>,
    pub separations_used: Vec<(String, crate::color::DeviceFallback)>,
}

impl Page {
    /// Copies a drained draw context's resource usage into this page, so
    /// the writer can build `/Resources` without re-walking the content
    /// stream. Idempotent for separations (by sanitized name); the other
    /// resource kinds are deduplicated downstream by object index anyway.
    pub fn absorb_resources(&mut self, ctx: &crate::draw::DrawContext) {
        self.fonts_used.extend(ctx.resource_font_ids().map(FontId::from_index));
        self.images_used.extend(ctx.resource_image_ids().map(ImageId::from_index));
        self.graphics_states_used
            .extend(ctx.resource_graphics_state_ids().map(GraphicsStateId::from_index));
        self.patterns_used.extend(ctx.resource_pattern_ids().map(PatternId::from_index));
        self.shadings_used.extend(ctx.resource_shading_ids().map(ShadingId::from_index));
        self.forms_used.extend(ctx.resource_form_ids().map(FormXObjectId::from_index));
        self.transparency_groups_used
            .extend(ctx.resource_transparency_group_ids().map(TransparencyGroupId::from_index));
        self.lab_colorspaces_used
            .extend(ctx.resource_lab_colorspace_ids().map(LabColorSpaceId::from_index));
        self.icc_colorspaces_used
            .extend(ctx.resource_icc_colorspace_ids().map(IccProfileId::from_index));
        for (name, fallback) in ctx.resource_separations() {
            if !self.separations_used.iter().any(|(n, _)| n == name) {
                self.separations_used.push((name.to_string(), fallback));
            }
        }
    }
}

/// `(font_file_object, font_descriptor_object, font_dict_object,
/// font_data_index)`. `font_data_index`
/// points into [`Generator::font_data`], the parallel container holding
/// the parsed font plus its incremental subsetter state.
pub struct FontRegistryEntry {
    pub font_file_object: ObjectNumber,
    pub font_descriptor_object: ObjectNumber,
    pub font_dict_object: ObjectNumber,
    pub font_data_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMaskMode {
    None,
    Stencil,
}

/// `(size, object_number)` plus the rest of an image's registry entry.
pub struct ImageRegistryEntry {
    pub width: u32,
    pub height: u32,
    pub object_number: ObjectNumber,
    pub smask_object: Option<ObjectNumber>,
    pub mask_mode: ImageMaskMode,
}

pub struct LabColorSpaceEntry {
    pub white_point: [f32; 3],
    pub range: [f32; 4],
}

pub struct PatternEntry {
    pub kind: PatternKind,
    pub matrix: [f32; 6],
    pub object_number: ObjectNumber,
}

pub enum PatternKind {
    Shading(ShadingId),
    Tiling { content: String, bbox: Rect, x_step: f32, y_step: f32 },
}

pub enum FunctionEntry {
    Type2 {
        domain: [f32; 2],
        c0: Vec<f32>,
        c1: Vec<f32>,
        exponent: f32,
    },
    Type3 {
        domain: [f32; 2],
        functions: Vec<FunctionId>,
        bounds: Vec<f32>,
        encode: Vec<f32>,
    },
}

pub enum ShadingEntry {
    Axial {
        coords: [f32; 4],
        function: FunctionId,
        extend: (bool, bool),
    },
    Radial {
        coords: [f32; 6],
        function: FunctionId,
        extend: (bool, bool),
    },
    /// Type 4 free-form Gouraud-shaded triangle mesh: vertices in
    /// start-strip/continue edge-flag form.
    GouraudTriangleMesh {
        bits_per_coordinate: u8,
        bits_per_component: u8,
        decode: Vec<f32>,
        vertices: Vec<GouraudVertex>,
    },
    /// Type 6 tensor-product patch mesh.
    TensorPatchMesh {
        bits_per_coordinate: u8,
        bits_per_component: u8,
        decode: Vec<f32>,
        patches: Vec<TensorPatch>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct GouraudVertex {
    pub edge_flag: u8,
    pub x: f32,
    pub y: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct TensorPatch {
    pub edge_flag: u8,
    pub points: Vec<(f32, f32)>,
    pub colors: Vec<[f32; 4]>,
}

/// A reusable content stream invoked with `Do`, independent of the
/// transparency-group machinery.
pub struct FormXObjectEntry {
    pub bbox: Rect,
    pub matrix: [f32; 6],
    pub content: String,
    pub object_number: ObjectNumber,
}

pub struct TransparencyGroupEntry {
    pub bbox: Rect,
    pub isolated: bool,
    pub knockout: bool,
    pub color_space: Option<IccColorSpace>,
    pub content: String,
    pub object_number: ObjectNumber,
}

pub struct OutlineEntry {
    pub title: String,
    pub parent: Option<OutlineId>,
    pub children: Vec<OutlineId>,
    pub dest_page: Option<usize>,
    pub object_number: ObjectNumber,
}

pub struct StructureItemEntry {
    pub type_or_role: String,
    pub parent: Option<StructureItemId>,
    pub children: Vec<StructureItemId>,
    pub object_number: ObjectNumber,
}

pub enum Annotation {
    Link(LinkAnnotation),
}

pub struct AnnotationEntry {
    pub annotation: Annotation,
    pub used: bool,
    pub object_number: ObjectNumber,
}

pub struct FormWidgetEntry {
    pub rect: Rect,
    pub on_state: String,
    pub off_state: String,
    pub name: String,
    pub object_number: ObjectNumber,
}

#[derive(Debug, Clone, Copy)]
pub enum OcgIntent {
    View,
    Design,
}

pub struct OptionalContentGroupEntry {
    pub name: String,
    pub intent: Vec<OcgIntent>,
    pub object_number: ObjectNumber,
}

pub struct EmbeddedFileEntry {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub object_number: ObjectNumber,
}

/// Document-level configuration passed to `Generator::new`.
#[derive(Debug, Clone)]
pub struct DocumentProperties {
    pub title: String,
    pub author: String,
    pub creator: String,
    pub producer: String,
    pub language: String,
    pub output_color_space: IccColorSpace,
    pub conformance: PdfConformance,
    pub compress_streams: bool,
    pub default_page_size: (Mm, Mm),
}

impl Default for DocumentProperties {
    fn default() -> Self {
        DocumentProperties {
            title: String::new(),
            author: String::new(),
            creator: String::new(),
            producer: String::new(),
            language: "en".to_string(),
            output_color_space: IccColorSpace::Rgb,
            conformance: PdfConformance::default(),
            compress_streams: true,
            default_page_size: (Mm(210.0), Mm(297.0)),
        }
    }
}

/// Registrar for all typed resources, assigner of object numbers
/// Exclusively owns every registry; handles returned from
/// its `add_*`/`load_*` methods are weak indices that stay valid for
/// the generator's whole lifetime.
pub struct Generator {
    pub properties: DocumentProperties,
    pub source_date_epoch: Option<i64>,
    written: bool,

    objects: Vec<PdfObject>,

    pages: Vec<Page>,
    fonts: Vec<FontRegistryEntry>,
    /// ToUnicode CMap stream object per font, parallel to `fonts`. Kept
    /// outside [`FontRegistryEntry`] since that tuple's
    /// shape at four fields.
    font_tounicode_objects: Vec<ObjectNumber>,
    font_data: Vec<ParsedFont>,
    images: Vec<ImageRegistryEntry>,
    lab_colorspaces: Vec<LabColorSpaceEntry>,
    icc_profiles: Vec<IccProfile>,
    patterns: Vec<PatternEntry>,
    graphics_states: Vec<ExtendedGraphicsState>,
    functions: Vec<FunctionEntry>,
    shadings: Vec<ShadingEntry>,
    form_xobjects: Vec<FormXObjectEntry>,
    transparency_groups: Vec<TransparencyGroupEntry>,
    outlines: Vec<OutlineEntry>,
    structure_items: Vec<StructureItemEntry>,
    rolemap: Vec<(String, String)>,
    annotations: Vec<AnnotationEntry>,
    form_widgets: Vec<FormWidgetEntry>,
    optional_content_groups: Vec<OptionalContentGroupEntry>,
    embedded_files: Vec<EmbeddedFileEntry>,

    color_converter: ColorConverter,
}

/// Image pixel data plus the declared properties needed to
/// register it (color space, optional alpha, interpolation).
pub struct ImageProperties {
    pub width: u32,
    pub height: u32,
    pub color_space: IccColorSpace,
    pub samples: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
    pub interpolate: bool,
    pub as_mask: bool,
    pub icc_profile: Option<IccProfileId>,
}

impl Generator {
    pub fn new(properties: DocumentProperties) -> Result<Self> {
        let source_date_epoch = std::env::var("SOURCE_DATE_EPOCH")
            .ok()
            .and_then(|v| v.parse::<i64>().ok());

        Ok(Generator {
            properties,
            source_date_epoch,
            written: false,
            // index 0 is reserved, so push a placeholder to keep
            // `objects[n-1]` aligned with object number `n`.
            objects: Vec::new(),
            pages: Vec::new(),
            fonts: Vec::new(),
            font_tounicode_objects: Vec::new(),
            font_data: Vec::new(),
            images: Vec::new(),
            lab_colorspaces: Vec::new(),
            icc_profiles: Vec::new(),
            patterns: Vec::new(),
            graphics_states: Vec::new(),
            functions: Vec::new(),
            shadings: Vec::new(),
            form_xobjects: Vec::new(),
            transparency_groups: Vec::new(),
            outlines: Vec::new(),
            structure_items: Vec::new(),
            rolemap: Vec::new(),
            annotations: Vec::new(),
            form_widgets: Vec::new(),
            optional_content_groups: Vec::new(),
            embedded_files: Vec::new(),
            color_converter: ColorConverter::new(None, None, None)?,
        })
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn mark_written(&mut self) -> Result<()> {
        if self.written {
            return Err(Error::WritingTwice);
        }
        self.written = true;
        Ok(())
    }

    pub fn objects(&self) -> &[PdfObject] {
        &self.objects
    }

    pub fn color_converter(&self) -> &ColorConverter {
        &self.color_converter
    }

    pub(crate) fn allocate_object(&mut self) -> ObjectNumber {
        self.objects.push(PdfObject::Placeholder);
        self.objects.len() as ObjectNumber
    }

    fn allocate_deferred(&mut self, obj: DeferredObject) -> ObjectNumber {
        self.objects.push(PdfObject::Deferred(obj));
        self.objects.len() as ObjectNumber
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn font_registry_len(&self) -> usize {
        self.fonts.len()
    }

    pub fn image_registry_len(&self) -> usize {
        self.images.len()
    }

    pub fn lab_colorspace_len(&self) -> usize {
        self.lab_colorspaces.len()
    }

    pub fn icc_profile_len(&self) -> usize {
        self.icc_profiles.len()
    }

    pub fn graphics_state_len(&self) -> usize {
        self.graphics_states.len()
    }

    pub fn function_len(&self) -> usize {
        self.functions.len()
    }

    pub fn shading_len(&self) -> usize {
        self.shadings.len()
    }

    pub fn pattern_len(&self) -> usize {
        self.patterns.len()
    }

    pub fn form_xobject_len(&self) -> usize {
        self.form_xobjects.len()
    }

    pub fn transparency_group_len(&self) -> usize {
        self.transparency_groups.len()
    }

    pub fn outline_len(&self) -> usize {
        self.outlines.len()
    }

    pub fn structure_item_len(&self) -> usize {
        self.structure_items.len()
    }

    pub fn annotation_len(&self) -> usize {
        self.annotations.len()
    }

    pub fn form_widget_len(&self) -> usize {
        self.form_widgets.len()
    }

    pub fn optional_content_group_len(&self) -> usize {
        self.optional_content_groups.len()
    }

    pub fn embedded_file_len(&self) -> usize {
        self.embedded_files.len()
    }

    pub fn form_widget(&self, id: FormWidgetId) -> Result<&FormWidgetEntry> {
        self.form_widgets
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.form_widgets.len() })
    }

    pub fn optional_content_group(&self, id: OptionalContentGroupId) -> Result<&OptionalContentGroupEntry> {
        self.optional_content_groups
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.optional_content_groups.len() })
    }

    pub fn embedded_file(&self, id: EmbeddedFileId) -> Result<&EmbeddedFileEntry> {
        self.embedded_files
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.embedded_files.len() })
    }

    pub fn annotation_entry(&self, id: AnnotationId) -> Result<&AnnotationEntry> {
        self.annotations
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.annotations.len() })
    }

    pub fn lab_colorspace(&self, id: LabColorSpaceId) -> Result<&LabColorSpaceEntry> {
        self.lab_colorspaces
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.lab_colorspaces.len() })
    }

    pub(crate) fn set_object(&mut self, number: ObjectNumber, obj: PdfObject) {
        self.objects[(number - 1) as usize] = obj;
    }

    /// Removes an object from the registry, leaving a placeholder behind,
    /// so the writer can pull a stream's bytes out of a registry-written
    /// entry (e.g. an image's pixel data) before re-wrapping it with its
    /// final dictionary.
    pub(crate) fn take_object(&mut self, number: ObjectNumber) -> PdfObject {
        std::mem::replace(&mut self.objects[(number - 1) as usize], PdfObject::Placeholder)
    }

    // --- pages -----------------------------------------------------

    /// Appends a new `(resources, content, page)` triple. The pages
    /// root itself is a deferred object materialized by the writer.
    pub fn add_page(&mut self, media_box: Option<Rect>) -> Page {
        let resource_dict_object = self.allocate_object();
        let content_stream_object = self.allocate_object();
        let page_object = self.allocate_object();
        Page {
            resource_dict_object,
            content_stream_object,
            page_object,
            media_box,
            content: String::new(),
            annotations: Vec::new(),
            widgets: Vec::new(),
            structure_parents: Vec::new(),
            fonts_used: Vec::new(),
            images_used: Vec::new(),
            graphics_states_used: Vec::new(),
            patterns_used: Vec::new(),
            shadings_used: Vec::new(),
            forms_used: Vec::new(),
            transparency_groups_used: Vec::new(),
            lab_colorspaces_used: Vec::new(),
            icc_colorspaces_used: Vec::new(),
            separations_used: Vec::new(),
        }
    }

    pub fn commit_page(&mut self, page: Page) -> usize {
        self.pages.push(page);
        self.pages.len() - 1
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Allocates the pages-root object. Call once per document, after
    /// all pages have been committed, just before writing.
    pub fn ensure_pages_root(&mut self) -> ObjectNumber {
        self.allocate_deferred(DeferredObject::PagesRoot)
    }

    // --- fonts -------------------------------------------------------

    /// Parses and registers a font file. The subsetter is lazily
    /// populated as glyphs are requested through [`Generator::font_mut`].
    pub fn load_font(&mut self, bytes: &[u8], font_index: usize) -> Result<FontId> {
        let parsed = ParsedFont::parse(bytes, font_index)?;
        let font_data_index = self.font_data.len();
        self.font_data.push(parsed);

        let font_file_object = self.allocate_deferred(DeferredObject::SubsetFontData(
            FontId::from_index(self.fonts.len()),
        ));
        let font_descriptor_object = self.allocate_deferred(DeferredObject::SubsetFontDescriptor(
            FontId::from_index(self.fonts.len()),
        ));
        let font_dict_object = self.allocate_deferred(DeferredObject::SubsetFontDict(
            FontId::from_index(self.fonts.len()),
        ));
        let tounicode_object = self.allocate_deferred(DeferredObject::SubsetToUnicodeCmap(
            FontId::from_index(self.fonts.len()),
        ));

        let id = FontId::from_index(self.fonts.len());
        self.fonts.push(FontRegistryEntry {
            font_file_object,
            font_descriptor_object,
            font_dict_object,
            font_data_index,
        });
        self.font_tounicode_objects.push(tounicode_object);
        Ok(id)
    }

    pub fn font_tounicode_object(&self, id: FontId) -> Result<ObjectNumber> {
        self.font_tounicode_objects
            .get(id.index())
            .copied()
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.font_tounicode_objects.len() })
    }

    pub fn font(&self, id: FontId) -> Result<&ParsedFont> {
        let entry = self
            .fonts
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.fonts.len() })?;
        Ok(&self.font_data[entry.font_data_index])
    }

    pub fn font_mut(&mut self, id: FontId) -> Result<&mut ParsedFont> {
        let entry = self
            .fonts
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.fonts.len() })?;
        Ok(&mut self.font_data[entry.font_data_index])
    }

    pub fn font_registry_entry(&self, id: FontId) -> Result<&FontRegistryEntry> {
        self.fonts
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.fonts.len() })
    }

    /// `utf8_text_width`: sums glyph advances for `text` set
    /// at `font`/`pointsize`.
    pub fn utf8_text_width(&mut self, font: FontId, pointsize: f32, text: &str) -> Result<f32> {
        let mut total = 0.0f32;
        for ch in text.chars() {
            total += self.glyph_advance(font, pointsize, ch as u32)?;
        }
        Ok(total)
    }

    /// `glyph_advance`: advance width, in points, of the
    /// glyph mapped to `codepoint` at `pointsize`. Resolves the
    /// codepoint into the font's subset (adding it if this is the
    /// first time it's been queried) and reads the advance from the
    /// subsetter's cached table.
    pub fn glyph_advance(&mut self, font: FontId, pointsize: f32, codepoint: u32) -> Result<f32> {
        let parsed = self.font_mut(font)?;
        let units_per_em = parsed.metrics().units_per_em.max(1) as f32;
        let subset_index = parsed.get_glyph_subset(codepoint, None)?;
        let advance = parsed.advance_for_subset_index(subset_index);
        Ok(advance as f32 * pointsize / units_per_em)
    }

    // --- images --------------------------------------------------------

    /// `add_image`: converts pixels to the document's
    /// output color space if required, computes an `/SMask` if alpha is
    /// present, and registers a stream object.
    pub fn add_image(&mut self, props: ImageProperties) -> Result<ImageId> {
        if props.as_mask && props.alpha.is_some() {
            return Err(Error::MaskAndAlpha);
        }
        self.enforce_output_intent_for_image(&props)?;

        let object_number = self.allocate_object();
        let smask_object = if let Some(alpha) = &props.alpha {
            let smask_obj = self.allocate_object();
            self.set_object(
                smask_obj,
                PdfObject::Deflate {
                    dict_prefix: String::new(),
                    stream: alpha.clone(),
                },
            );
            Some(smask_obj)
        } else {
            None
        };

        let target_cs = self.properties.output_color_space;
        let converted = if props.color_space == target_cs {
            props.samples
        } else {
            let embedded = props
                .icc_profile
                .map(|id| self.icc_profile(id))
                .transpose()?
                .cloned();
            let image = crate::icc::RasterImage {
                width: props.width,
                height: props.height,
                color_space: props.color_space,
                samples: props.samples,
                alpha: None,
            };
            let out = self.color_converter.convert_image_to(
                &image,
                target_cs,
                crate::icc::RenderingIntent::default(),
                embedded.as_ref(),
            )?;
            out.samples
        };

        self.set_object(
            object_number,
            PdfObject::Deflate {
                dict_prefix: String::new(),
                stream: converted,
            },
        );

        let id = ImageId::from_index(self.images.len());
        self.images.push(ImageRegistryEntry {
            width: props.width,
            height: props.height,
            object_number,
            smask_object,
            mask_mode: if props.as_mask { ImageMaskMode::Stencil } else { ImageMaskMode::None },
        });
        Ok(id)
    }

    /// `embed_jpg`: stores JPEG bytes verbatim as
    /// `/DCTDecode`, without pixel recompression.
    pub fn embed_jpg(&mut self, jpeg_bytes: Vec<u8>, width: u32, height: u32) -> Result<ImageId> {
        let object_number = self.allocate_object();
        self.set_object(
            object_number,
            PdfObject::Full {
                dict: String::new(),
                stream: Some(jpeg_bytes),
            },
        );
        let id = ImageId::from_index(self.images.len());
        self.images.push(ImageRegistryEntry {
            width,
            height,
            object_number,
            smask_object: None,
            mask_mode: ImageMaskMode::None,
        });
        Ok(id)
    }

    fn enforce_output_intent_for_image(&self, props: &ImageProperties) -> Result<()> {
        if !self.properties.conformance.must_have_icc_profile() {
            return Ok(());
        }
        if props.icc_profile.is_none() && props.color_space != self.properties.output_color_space {
            return Err(Error::ImageFormatNotPermitted);
        }
        Ok(())
    }

    pub fn image_registry_entry(&self, id: ImageId) -> Result<&ImageRegistryEntry> {
        self.images
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.images.len() })
    }

    // --- color spaces / ICC -------------------------------------------

    pub fn add_lab_colorspace(&mut self, white_point: [f32; 3], range: [f32; 4]) -> LabColorSpaceId {
        let id = LabColorSpaceId::from_index(self.lab_colorspaces.len());
        self.lab_colorspaces.push(LabColorSpaceEntry { white_point, range });
        id
    }

    pub fn load_icc_file(&mut self, bytes: Vec<u8>) -> Result<IccProfileId> {
        let profile = IccProfile::from_bytes(bytes)?;
        self.add_icc_profile(profile)
    }

    pub fn add_icc_profile(&mut self, profile: IccProfile) -> Result<IccProfileId> {
        let id = IccProfileId::from_index(self.icc_profiles.len());
        self.icc_profiles.push(profile);
        Ok(id)
    }

    pub fn icc_profile(&self, id: IccProfileId) -> Result<&IccProfile> {
        self.icc_profiles
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.icc_profiles.len() })
    }

    // --- graphics states -----------------------------------------------

    /// `add_graphics_state`: no deduplication required.
    pub fn add_graphics_state(&mut self, state: ExtendedGraphicsState) -> GraphicsStateId {
        let id = GraphicsStateId::from_index(self.graphics_states.len());
        self.graphics_states.push(state);
        id
    }

    pub fn graphics_state(&self, id: GraphicsStateId) -> Result<&ExtendedGraphicsState> {
        self.graphics_states
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.graphics_states.len() })
    }

    // --- functions / shadings / patterns ---------------------------

    pub fn add_function(&mut self, func: FunctionEntry) -> FunctionId {
        let id = FunctionId::from_index(self.functions.len());
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FunctionId) -> Result<&FunctionEntry> {
        self.functions
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.functions.len() })
    }

    pub fn add_shading(&mut self, shading: ShadingEntry) -> ShadingId {
        let id = ShadingId::from_index(self.shadings.len());
        self.shadings.push(shading);
        id
    }

    pub fn shading(&self, id: ShadingId) -> Result<&ShadingEntry> {
        self.shadings
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.shadings.len() })
    }

    /// `add_pattern`: shading or tiling; inherits the
    /// caller's resource dict in the tiling case (the caller is
    /// expected to have already serialized its content via a draw
    /// context and pass the resulting stream in `PatternKind::Tiling`).
    pub fn add_pattern(&mut self, kind: PatternKind, matrix: [f32; 6]) -> PatternId {
        let object_number = self.allocate_object();
        let id = PatternId::from_index(self.patterns.len());
        self.patterns.push(PatternEntry { kind, matrix, object_number });
        id
    }

    pub fn pattern(&self, id: PatternId) -> Result<&PatternEntry> {
        self.patterns
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.patterns.len() })
    }

    // --- form XObjects -----------------------------------------------

    /// Registers a serialized draw-context stream as a reusable form
    /// XObject, invoked with `Do` wherever the handle is passed.
    pub fn add_form_xobject(&mut self, content: String, bbox: Rect, matrix: [f32; 6]) -> FormXObjectId {
        let object_number = self.allocate_object();
        let id = FormXObjectId::from_index(self.form_xobjects.len());
        self.form_xobjects.push(FormXObjectEntry { bbox, matrix, content, object_number });
        id
    }

    pub fn form_xobject(&self, id: FormXObjectId) -> Result<&FormXObjectEntry> {
        self.form_xobjects
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.form_xobjects.len() })
    }

    // --- transparency groups ---------------------------------------

    pub fn add_transparency_group(
        &mut self,
        content: String,
        bbox: Rect,
        isolated: bool,
        knockout: bool,
        color_space: Option<IccColorSpace>,
    ) -> TransparencyGroupId {
        let object_number = self.allocate_object();
        let id = TransparencyGroupId::from_index(self.transparency_groups.len());
        self.transparency_groups.push(TransparencyGroupEntry {
            bbox,
            isolated,
            knockout,
            color_space,
            content,
            object_number,
        });
        id
    }

    pub fn transparency_group(&self, id: TransparencyGroupId) -> Result<&TransparencyGroupEntry> {
        self.transparency_groups
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.transparency_groups.len() })
    }

    // --- outlines -----------------------------------------------------

    /// `add_outline`: `/First`, `/Last`, `/Count`, `/Prev`,
    /// `/Next` are computed by the writer walking the parent/children
    /// index recorded here. Parent links must not cycle.
    pub fn add_outline(&mut self, title: String, parent: Option<OutlineId>, dest_page: Option<usize>) -> OutlineId {
        let object_number = self.allocate_object();
        let id = OutlineId::from_index(self.outlines.len());
        if let Some(parent_id) = parent {
            if let Some(parent_entry) = self.outlines.get_mut(parent_id.index()) {
                parent_entry.children.push(id);
            }
        }
        self.outlines.push(OutlineEntry {
            title,
            parent,
            children: Vec::new(),
            dest_page,
            object_number,
        });
        id
    }

    pub fn outlines(&self) -> &[OutlineEntry] {
        &self.outlines
    }

    // --- structure tree -------------------------------------------------

    /// `add_structure_item`: stored deferred; parent/child
    /// relationships are tracked so the writer can emit the structure
    /// tree (`/StructTreeRoot`, `/K` arrays).
    pub fn add_structure_item(
        &mut self,
        type_or_role: String,
        parent: Option<StructureItemId>,
    ) -> StructureItemId {
        let id = StructureItemId::from_index(self.structure_items.len());
        let object_number = self.allocate_deferred(DeferredObject::StructureItem(id));
        if let Some(parent_id) = parent {
            if let Some(parent_entry) = self.structure_items.get_mut(parent_id.index()) {
                parent_entry.children.push(id);
            }
        }
        self.structure_items.push(StructureItemEntry {
            type_or_role,
            parent,
            children: Vec::new(),
            object_number,
        });
        id
    }

    pub fn structure_item(&self, id: StructureItemId) -> Result<&StructureItemEntry> {
        self.structure_items
            .get(id.index())
            .ok_or(Error::IndexOutOfBounds { index: id.index(), len: self.structure_items.len() })
    }

    /// Records a custom-role to standard-role mapping for the structure
    /// tree's `/RoleMap`.
    pub fn add_rolemap_entry(&mut self, custom_role: String, standard_role: String) {
        self.rolemap.push((custom_role, standard_role));
    }

    pub fn rolemap(&self) -> &[(String, String)] {
        &self.rolemap
    }

    // --- annotations / form widgets -------------------------------------

    pub fn add_annotation(&mut self, annotation: Annotation) -> AnnotationId {
        let id = AnnotationId::from_index(self.annotations.len());
        let object_number = self.allocate_deferred(DeferredObject::Annotation(id));
        self.annotations.push(AnnotationEntry { annotation, used: false, object_number });
        id
    }

    /// Records that a page references `annotation`. Each annotation may
    /// be used at most once; a second use is reported as
    /// [`Error::AnnotationReuse`].
    pub fn use_annotation_on_page(&mut self, page: &mut Page, annotation: AnnotationId) -> Result<()> {
        let entry = self
            .annotations
            .get_mut(annotation.index())
            .ok_or(Error::IndexOutOfBounds { index: annotation.index(), len: self.annotations.len() })?;
        if entry.used {
            return Err(Error::AnnotationReuse(annotation));
        }
        entry.used = true;
        page.annotations.push(annotation);
        Ok(())
    }

    pub fn create_form_checkbox(
        &mut self,
        rect: Rect,
        on_state: String,
        off_state: String,
        name: String,
    ) -> FormWidgetId {
        let id = FormWidgetId::from_index(self.form_widgets.len());
        let object_number = self.allocate_deferred(DeferredObject::CheckboxWidget(id));
        self.form_widgets.push(FormWidgetEntry { rect, on_state, off_state, name, object_number });
        id
    }

    // --- optional content groups / embedded files -----------------------

    pub fn add_optional_content_group(&mut self, name: String, intent: Vec<OcgIntent>) -> OptionalContentGroupId {
        let object_number = self.allocate_object();
        let id = OptionalContentGroupId::from_index(self.optional_content_groups.len());
        self.optional_content_groups.push(OptionalContentGroupEntry { name, intent, object_number });
        id
    }

    pub fn embed_file(&mut self, name: String, mime_type: String, data: Vec<u8>) -> EmbeddedFileId {
        let object_number = self.allocate_object();
        let id = EmbeddedFileId::from_index(self.embedded_files.len());
        self.embedded_files.push(EmbeddedFileEntry { name, mime_type, data, object_number });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_round_trip_through_index() {
        let id = FontId::from_index(3);
        assert_eq!(id.index(), 3);
        assert_eq!(id, FontId::from_index(3));
        assert_ne!(id, FontId::from_index(4));
    }

    #[test]
    fn new_generator_has_no_pages() {
        let gen = Generator::new(DocumentProperties::default()).unwrap();
        assert!(gen.pages().is_empty());
        assert!(!gen.is_written());
    }

    #[test]
    fn add_page_allocates_three_objects() {
        let mut gen = Generator::new(DocumentProperties::default()).unwrap();
        let page = gen.add_page(None);
        assert_eq!(page.page_object, page.resource_dict_object + 2);
        gen.commit_page(page);
        assert_eq!(gen.pages().len(), 1);
    }

    #[test]
    fn double_write_is_rejected() {
        let mut gen = Generator::new(DocumentProperties::default()).unwrap();
        gen.mark_written().unwrap();
        assert!(matches!(gen.mark_written().unwrap_err(), Error::WritingTwice));
    }

    #[test]
    fn outline_tracks_parent_child_links() {
        let mut gen = Generator::new(DocumentProperties::default()).unwrap();
        let root = gen.add_outline("Chapter 1".to_string(), None, Some(0));
        let child = gen.add_outline("Section 1.1".to_string(), Some(root), Some(1));
        assert_eq!(gen.outlines()[root.index()].children, vec![child]);
    }

    #[test]
    fn annotation_reuse_is_rejected() {
        let mut gen = Generator::new(DocumentProperties::default()).unwrap();
        let link = crate::annotation::LinkAnnotation::new(
            Rect::from_wh(crate::units::Pt(10.0), crate::units::Pt(10.0)),
            None,
            None,
            crate::annotation::Actions::uri("https://example.com".to_string()),
            None,
        );
        let annot = gen.add_annotation(Annotation::Link(link));
        let mut page = gen.add_page(None);
        gen.use_annotation_on_page(&mut page, annot).unwrap();
        let err = gen.use_annotation_on_page(&mut page, annot).unwrap_err();
        assert!(matches!(err, Error::AnnotationReuse(_)));
    }
}
