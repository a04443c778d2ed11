//! Scan Descriptor - validated, compiled field map of one class
//!
//! A [`LayoutSpec`] is validated once and compiled into a flat,
//! offset-sorted list of [`Slot`]s for the fixed part (embedded arrays
//! unrolled) plus an element template for the trailing array. Scanning is
//! then a linear walk with no recursion.

use crate::error::{Result, StampError};
use crate::layout::field::{FieldDescriptor, FieldKind, LayoutSpec};
use crate::object::{TagScheme, HEADER_SIZE};
use crate::util::{is_word_aligned, WORD_SIZE};

/// What the collector does with a word slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Owning,
    Tagged,
    /// Raw pointer adjusted on relocation but never traced
    Fixable,
}

/// One word the collector must look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: usize,
    pub kind: SlotKind,
}

/// Compiled trailing variable-length array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingLayout {
    /// Start of element 0, always the end of the fixed part
    pub offset: usize,
    pub length_offset: usize,
    pub stride: usize,
    /// Element-relative slots
    pub slots: Box<[Slot]>,
}

/// Receives every traced reference slot of an object
pub trait ReferenceVisitor {
    /// Non-null untagged reference
    fn visit_owning(&mut self, slot: *mut usize);

    /// Tagged word whose low tag names a pointer
    fn visit_tagged(&mut self, slot: *mut usize);
}

/// Validated scan descriptor of one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDescriptor {
    size: usize,
    slots: Box<[Slot]>,
    trailing: Option<TrailingLayout>,
    fields: Vec<FieldDescriptor>,
}

impl ScanDescriptor {
    /// Validate `layout` for class `class` and compile it
    ///
    /// With `strict`, the length field of a trailing array must be declared
    /// as one word of plain data.
    pub fn compile(class: &str, layout: &LayoutSpec, strict: bool) -> Result<Self> {
        if layout.size < HEADER_SIZE {
            return Err(StampError::SizeTooSmall {
                class: class.to_string(),
                size: layout.size,
                minimum: HEADER_SIZE,
            });
        }

        let check = Checker { class };
        check.fields(&layout.fields, HEADER_SIZE, layout.size, false)?;

        let mut trailing_fields = layout.fields.iter().filter_map(|field| match &field.kind {
            FieldKind::TrailingArray {
                length_offset,
                stride,
                element,
            } => Some(TrailingDecl {
                field,
                length_offset: *length_offset,
                stride: *stride,
                element,
            }),
            _ => None,
        });
        let trailing_field = trailing_fields.next();
        if trailing_fields.next().is_some() {
            return Err(StampError::MultipleTrailingArrays {
                class: class.to_string(),
            });
        }

        let mut slots = Vec::new();
        compile_slots(&layout.fields, 0, &mut slots);
        slots.sort_by_key(|slot| slot.offset);

        let trailing = match trailing_field {
            Some(decl) => Some(check.trailing(decl, layout, &slots, strict)?),
            None => None,
        };

        Ok(Self {
            size: layout.size,
            slots: slots.into_boxed_slice(),
            trailing,
            fields: layout.fields.clone(),
        })
    }

    /// Fixed-part size, header included
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[inline]
    pub fn trailing(&self) -> Option<&TrailingLayout> {
        self.trailing.as_ref()
    }

    /// Source fields, as declared
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of traced slots in the fixed part
    pub fn traced_slot_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.kind != SlotKind::Fixable)
            .count()
    }

    /// True when the collector never needs to look inside the object
    pub fn is_leaf_object(&self) -> bool {
        self.slots.is_empty()
            && self
                .trailing
                .as_ref()
                .map_or(true, |trailing| trailing.slots.is_empty())
    }

    /// Element count of the trailing array, 0 without one
    ///
    /// # Safety
    ///
    /// `address` must point to a live object of this class.
    #[inline]
    pub unsafe fn trailing_len(&self, address: usize) -> usize {
        match &self.trailing {
            Some(trailing) => *((address + trailing.length_offset) as *const usize),
            None => 0,
        }
    }

    /// Total object size: fixed part plus trailing elements
    ///
    /// # Safety
    ///
    /// `address` must point to a live object of this class.
    pub unsafe fn object_size(&self, address: usize) -> usize {
        let stride = self.trailing.as_ref().map_or(0, |trailing| trailing.stride);
        self.size + self.trailing_len(address) * stride
    }

    /// Visit every traced reference of the object at `address`
    ///
    /// Null owning slots and tagged words that are null or immediates are
    /// skipped. Fixable slots are not visited.
    ///
    /// # Safety
    ///
    /// `address` must point to a live object of this class that is not
    /// accessed concurrently for the duration of the call.
    pub unsafe fn for_each_reference<V: ReferenceVisitor + ?Sized>(
        &self,
        address: usize,
        scheme: &TagScheme,
        visitor: &mut V,
    ) {
        let mut visit = |slot_addr: usize, kind: SlotKind| {
            let slot = slot_addr as *mut usize;
            let word = *slot;
            match kind {
                SlotKind::Owning if word != 0 => visitor.visit_owning(slot),
                SlotKind::Tagged if scheme.is_pointer(word) => visitor.visit_tagged(slot),
                _ => {}
            }
        };

        for slot in self.slots.iter() {
            visit(address + slot.offset, slot.kind);
        }
        self.for_each_trailing_slot(address, &mut visit);
    }

    /// Call `f` with every fixable raw-pointer slot of the object
    ///
    /// # Safety
    ///
    /// Same contract as [`ScanDescriptor::for_each_reference`].
    pub unsafe fn for_each_fixable(&self, address: usize, mut f: impl FnMut(*mut usize)) {
        let mut visit = |slot_addr: usize, kind: SlotKind| {
            if kind == SlotKind::Fixable {
                f(slot_addr as *mut usize);
            }
        };

        for slot in self.slots.iter() {
            visit(address + slot.offset, slot.kind);
        }
        self.for_each_trailing_slot(address, &mut visit);
    }

    unsafe fn for_each_trailing_slot(&self, address: usize, visit: &mut impl FnMut(usize, SlotKind)) {
        let Some(trailing) = &self.trailing else {
            return;
        };
        if trailing.slots.is_empty() {
            return;
        }
        let len = self.trailing_len(address);
        let base = address + trailing.offset;
        for i in 0..len {
            let element = base + i * trailing.stride;
            for slot in trailing.slots.iter() {
                visit(element + slot.offset, slot.kind);
            }
        }
    }
}

fn compile_slots(fields: &[FieldDescriptor], base: usize, out: &mut Vec<Slot>) {
    for field in fields {
        let offset = base + field.offset;
        match &field.kind {
            FieldKind::Owning => out.push(Slot {
                offset,
                kind: SlotKind::Owning,
            }),
            FieldKind::Tagged => out.push(Slot {
                offset,
                kind: SlotKind::Tagged,
            }),
            FieldKind::Raw { fixable: true } => out.push(Slot {
                offset,
                kind: SlotKind::Fixable,
            }),
            FieldKind::EmbeddedArray {
                count,
                stride,
                element,
            } => {
                for i in 0..*count {
                    compile_slots(element, offset + i * stride, out);
                }
            }
            FieldKind::Raw { fixable: false }
            | FieldKind::Data { .. }
            | FieldKind::TrailingArray { .. } => {}
        }
    }
}

/// A trailing array field with its parts pulled out
struct TrailingDecl<'a> {
    field: &'a FieldDescriptor,
    length_offset: usize,
    stride: usize,
    element: &'a [FieldDescriptor],
}

/// Validation with the class name at hand for error messages
struct Checker<'a> {
    class: &'a str,
}

impl Checker<'_> {
    /// Check `fields` against the byte window `[min, size)`
    fn fields(&self, fields: &[FieldDescriptor], min: usize, size: usize, nested: bool) -> Result<()> {
        for field in fields {
            if let FieldKind::TrailingArray { .. } = field.kind {
                if nested {
                    return Err(StampError::NestedTrailingArray {
                        class: self.class.to_string(),
                        field: field.name.clone(),
                    });
                }
                continue;
            }

            if field.kind.is_word() && !is_word_aligned(field.offset) {
                return Err(StampError::MisalignedField {
                    class: self.class.to_string(),
                    field: field.name.clone(),
                    offset: field.offset,
                });
            }
            if field.offset < min {
                return Err(StampError::FieldOverlapsHeader {
                    class: self.class.to_string(),
                    field: field.name.clone(),
                    offset: field.offset,
                });
            }
            if field.end() > size || field.width() == 0 {
                return Err(StampError::FieldOutOfBounds {
                    class: self.class.to_string(),
                    field: field.name.clone(),
                    offset: field.offset,
                    size,
                });
            }
            if let Some(actual) = field.measured_width {
                if actual != field.width() {
                    return Err(StampError::FieldWidthMismatch {
                        class: self.class.to_string(),
                        field: field.name.clone(),
                        expected: field.width(),
                        actual,
                    });
                }
            }

            if let FieldKind::EmbeddedArray { stride, element, .. } = &field.kind {
                self.array(field, *stride, element)?;
            }
        }

        self.no_overlap(fields)
    }

    fn array(&self, field: &FieldDescriptor, stride: usize, element: &[FieldDescriptor]) -> Result<()> {
        let traced = element.iter().any(|f| !matches!(f.kind, FieldKind::Data { .. }));
        let element_end = element.iter().map(FieldDescriptor::end).max().unwrap_or(0);
        if stride == 0 || element_end > stride || (traced && !is_word_aligned(stride)) {
            return Err(StampError::InvalidStride {
                class: self.class.to_string(),
                field: field.name.clone(),
                stride,
            });
        }
        self.fields(element, 0, stride, true)
    }

    fn no_overlap(&self, fields: &[FieldDescriptor]) -> Result<()> {
        let mut spans: Vec<&FieldDescriptor> = fields
            .iter()
            .filter(|field| field.width() > 0)
            .collect();
        spans.sort_by_key(|field| field.offset);

        for pair in spans.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(StampError::FieldsOverlap {
                    class: self.class.to_string(),
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }
        Ok(())
    }

    fn trailing(
        &self,
        decl: TrailingDecl<'_>,
        layout: &LayoutSpec,
        fixed_slots: &[Slot],
        strict: bool,
    ) -> Result<TrailingLayout> {
        let TrailingDecl {
            field,
            length_offset,
            stride,
            element,
        } = decl;

        if field.offset != layout.size {
            return Err(StampError::TrailingArrayNotAtEnd {
                class: self.class.to_string(),
                field: field.name.clone(),
                offset: field.offset,
                size: layout.size,
            });
        }
        if let Some(actual) = field.measured_width.filter(|&w| w != 0) {
            return Err(StampError::FieldWidthMismatch {
                class: self.class.to_string(),
                field: field.name.clone(),
                expected: 0,
                actual,
            });
        }

        let invalid_length = |reason: &str| StampError::InvalidLengthField {
            class: self.class.to_string(),
            field: field.name.clone(),
            reason: reason.to_string(),
        };
        if !is_word_aligned(length_offset) {
            return Err(invalid_length("not word-aligned"));
        }
        if length_offset < HEADER_SIZE || length_offset.saturating_add(WORD_SIZE) > layout.size {
            return Err(invalid_length("outside the fixed part"));
        }
        if fixed_slots.iter().any(|slot| slot.offset == length_offset) {
            return Err(invalid_length("overlaps a reference slot"));
        }
        if strict {
            let declared_data = layout.fields.iter().any(|f| {
                f.offset == length_offset && f.kind == FieldKind::Data { width: WORD_SIZE }
            });
            if !declared_data {
                return Err(invalid_length("not declared as one word of plain data"));
            }
        }

        self.array(field, stride, element)?;

        let mut slots = Vec::new();
        compile_slots(element, 0, &mut slots);
        slots.sort_by_key(|slot| slot.offset);

        Ok(TrailingLayout {
            offset: field.offset,
            length_offset,
            stride,
            slots: slots.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = WORD_SIZE;

    fn compile(layout: LayoutSpec) -> Result<ScanDescriptor> {
        ScanDescriptor::compile("Test", &layout, true)
    }

    struct Collect {
        owning: Vec<usize>,
        tagged: Vec<usize>,
    }

    impl ReferenceVisitor for Collect {
        fn visit_owning(&mut self, slot: *mut usize) {
            self.owning.push(unsafe { *slot });
        }

        fn visit_tagged(&mut self, slot: *mut usize) {
            self.tagged.push(unsafe { *slot });
        }
    }

    #[test]
    fn test_zero_field_class() {
        let descriptor = compile(LayoutSpec::new(HEADER_SIZE + W).data("value", 16, 8)).unwrap();
        assert!(descriptor.is_leaf_object());
        assert_eq!(descriptor.traced_slot_count(), 0);
    }

    #[test]
    fn test_embedded_array_unrolled() {
        let layout = LayoutSpec::new(64).owning("a", 16).embedded(
            "pairs",
            24,
            2,
            16,
            vec![FieldDescriptor::tagged("key", 0), FieldDescriptor::data("hash", 8, 8)],
        );
        let descriptor = compile(layout).unwrap();
        let offsets: Vec<_> = descriptor.slots().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![16, 24, 40]);
    }

    #[test]
    fn test_layout_errors() {
        let too_small = compile(LayoutSpec::new(8));
        assert!(matches!(too_small, Err(StampError::SizeTooSmall { .. })));

        let misaligned = compile(LayoutSpec::new(32).owning("car", 20));
        assert!(matches!(misaligned, Err(StampError::MisalignedField { .. })));

        let header = compile(LayoutSpec::new(32).owning("car", 8));
        assert!(matches!(header, Err(StampError::FieldOverlapsHeader { .. })));

        let outside = compile(LayoutSpec::new(24).owning("car", 24));
        assert!(matches!(outside, Err(StampError::FieldOutOfBounds { .. })));

        let overlap = compile(LayoutSpec::new(32).data("flags", 16, 12).tagged("cdr", 24));
        assert!(matches!(overlap, Err(StampError::FieldsOverlap { .. })));

        let stride = compile(LayoutSpec::new(48).embedded("e", 16, 2, 4, vec![FieldDescriptor::tagged("x", 0)]));
        assert!(matches!(stride, Err(StampError::InvalidStride { .. })));
    }

    #[test]
    fn test_overflowing_widths_out_of_bounds() {
        let huge_count = compile(LayoutSpec::new(64).embedded(
            "items",
            16,
            1 << 61,
            W,
            vec![FieldDescriptor::owning("item", 0)],
        ));
        assert!(matches!(huge_count, Err(StampError::FieldOutOfBounds { .. })));

        let huge_data = compile(LayoutSpec::new(64).data("blob", 16, usize::MAX));
        assert!(matches!(huge_data, Err(StampError::FieldOutOfBounds { .. })));

        let element = vec![FieldDescriptor::tagged("element", 0)];
        let far_length = compile(LayoutSpec::new(32).trailing("a", 32, usize::MAX - 7, W, element));
        assert!(matches!(far_length, Err(StampError::InvalidLengthField { .. })));
    }

    #[test]
    fn test_trailing_array_errors() {
        let element = || vec![FieldDescriptor::tagged("element", 0)];

        let two = compile(
            LayoutSpec::new(24)
                .data("len", 16, 8)
                .trailing("a", 24, 16, W, element())
                .trailing("b", 24, 16, W, element()),
        );
        assert!(matches!(two, Err(StampError::MultipleTrailingArrays { .. })));

        let not_at_end = compile(LayoutSpec::new(32).data("len", 16, 8).trailing("a", 24, 16, W, element()));
        assert!(matches!(not_at_end, Err(StampError::TrailingArrayNotAtEnd { .. })));

        let traced_length = compile(LayoutSpec::new(24).owning("len", 16).trailing("a", 24, 16, W, element()));
        assert!(matches!(traced_length, Err(StampError::InvalidLengthField { .. })));

        let undeclared = LayoutSpec::new(24).trailing("a", 24, 16, W, element());
        assert!(matches!(compile(undeclared.clone()), Err(StampError::InvalidLengthField { .. })));
        assert!(ScanDescriptor::compile("Test", &undeclared, false).is_ok());

        let nested = compile(LayoutSpec::new(40).data("len", 16, 8).embedded(
            "e",
            24,
            2,
            8,
            vec![FieldDescriptor::trailing("inner", 0, 0, 8, vec![])],
        ));
        assert!(matches!(nested, Err(StampError::NestedTrailingArray { .. })));
    }

    #[test]
    fn test_scan_skips_null_and_immediates() {
        // header(2) | car | cdr | len | elements...
        let mut object: [usize; 8] = [0, 1, 0x1000, 0b10_000, 3, 0x2001, 0x3003, 42 << 3];
        let layout = LayoutSpec::new(40)
            .owning("car", 16)
            .tagged("cdr", 24)
            .data("len", 32, 8)
            .trailing("items", 40, 32, W, vec![FieldDescriptor::tagged("element", 0)]);
        let descriptor = compile(layout).unwrap();
        let address = object.as_mut_ptr() as usize;

        let mut visitor = Collect {
            owning: Vec::new(),
            tagged: Vec::new(),
        };
        unsafe {
            descriptor.for_each_reference(address, &TagScheme::default(), &mut visitor);
            assert_eq!(descriptor.object_size(address), 40 + 3 * W);
        }

        assert_eq!(visitor.owning, vec![0x1000]);
        // cdr holds an immediate; the last element is a fixnum
        assert_eq!(visitor.tagged, vec![0x2001, 0x3003]);
    }

    #[test]
    fn test_for_each_fixable() {
        let mut object: [usize; 4] = [0, 1, 0x5000, 0x6000];
        let descriptor = compile(LayoutSpec::new(32).fixable("cursor", 16).raw("buffer", 24)).unwrap();
        let mut seen = Vec::new();
        unsafe {
            descriptor.for_each_fixable(object.as_mut_ptr() as usize, |slot| seen.push(*slot));
        }
        assert_eq!(seen, vec![0x5000]);
        assert_eq!(descriptor.traced_slot_count(), 0);
    }
}
