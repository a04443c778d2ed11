//! Field descriptors - what lives at each offset of an object
//!
//! Offsets are byte offsets from the start of the object, header included.
//! Element fields of arrays are relative to the start of the element.

use crate::util::WORD_SIZE;
use serde::{Deserialize, Serialize};

/// Kind of a field, as declared by the layout tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Untagged pointer to a managed object; traced and relocated
    Owning,
    /// Tagged word; the address payload is traced, tag bits are preserved
    Tagged,
    /// Pointer the collector never follows; adjusted on relocation when
    /// `fixable`
    Raw {
        #[serde(default)]
        fixable: bool,
    },
    /// Plain data, never touched
    Data { width: usize },
    /// `count` elements of `stride` bytes, recursed in place
    EmbeddedArray {
        count: usize,
        stride: usize,
        #[serde(default)]
        element: Vec<FieldDescriptor>,
    },
    /// Variable-length array after the fixed part; its element count is
    /// the word at `length_offset`
    TrailingArray {
        length_offset: usize,
        stride: usize,
        #[serde(default)]
        element: Vec<FieldDescriptor>,
    },
}

impl FieldKind {
    /// Short name for diagnostics and dumps
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Owning => "owning",
            FieldKind::Tagged => "tagged",
            FieldKind::Raw { fixable: true } => "fixable",
            FieldKind::Raw { fixable: false } => "raw",
            FieldKind::Data { .. } => "data",
            FieldKind::EmbeddedArray { .. } => "embedded",
            FieldKind::TrailingArray { .. } => "trailing",
        }
    }

    /// Fields that hold exactly one pointer-sized word
    pub fn is_word(&self) -> bool {
        matches!(self, FieldKind::Owning | FieldKind::Tagged | FieldKind::Raw { .. })
    }
}

/// One field of an object or array element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: usize,
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Width measured from the Rust type, when the layout was derived
    #[serde(skip)]
    pub measured_width: Option<usize>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, offset: usize, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            offset,
            kind,
            measured_width: None,
        }
    }

    pub fn owning(name: impl Into<String>, offset: usize) -> Self {
        Self::new(name, offset, FieldKind::Owning)
    }

    pub fn tagged(name: impl Into<String>, offset: usize) -> Self {
        Self::new(name, offset, FieldKind::Tagged)
    }

    pub fn raw(name: impl Into<String>, offset: usize) -> Self {
        Self::new(name, offset, FieldKind::Raw { fixable: false })
    }

    pub fn fixable(name: impl Into<String>, offset: usize) -> Self {
        Self::new(name, offset, FieldKind::Raw { fixable: true })
    }

    pub fn data(name: impl Into<String>, offset: usize, width: usize) -> Self {
        Self::new(name, offset, FieldKind::Data { width })
    }

    pub fn embedded(
        name: impl Into<String>,
        offset: usize,
        count: usize,
        stride: usize,
        element: Vec<FieldDescriptor>,
    ) -> Self {
        Self::new(
            name,
            offset,
            FieldKind::EmbeddedArray {
                count,
                stride,
                element,
            },
        )
    }

    pub fn trailing(
        name: impl Into<String>,
        offset: usize,
        length_offset: usize,
        stride: usize,
        element: Vec<FieldDescriptor>,
    ) -> Self {
        Self::new(
            name,
            offset,
            FieldKind::TrailingArray {
                length_offset,
                stride,
                element,
            },
        )
    }

    /// Record the width measured from the Rust field type
    pub fn measured(mut self, width: usize) -> Self {
        self.measured_width = Some(width);
        self
    }

    /// Bytes occupied inside the fixed part; trailing arrays occupy none.
    /// Saturates, so an absurd width still fails bounds checks
    pub fn width(&self) -> usize {
        match &self.kind {
            FieldKind::Owning | FieldKind::Tagged | FieldKind::Raw { .. } => WORD_SIZE,
            FieldKind::Data { width } => *width,
            FieldKind::EmbeddedArray { count, stride, .. } => count.saturating_mul(*stride),
            FieldKind::TrailingArray { .. } => 0,
        }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.width())
    }
}

/// Declared layout of one class: fixed size plus fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub size: usize,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl LayoutSpec {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, field: FieldDescriptor) {
        self.fields.push(field);
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn owning(self, name: &str, offset: usize) -> Self {
        self.field(FieldDescriptor::owning(name, offset))
    }

    pub fn tagged(self, name: &str, offset: usize) -> Self {
        self.field(FieldDescriptor::tagged(name, offset))
    }

    pub fn raw(self, name: &str, offset: usize) -> Self {
        self.field(FieldDescriptor::raw(name, offset))
    }

    pub fn fixable(self, name: &str, offset: usize) -> Self {
        self.field(FieldDescriptor::fixable(name, offset))
    }

    pub fn data(self, name: &str, offset: usize, width: usize) -> Self {
        self.field(FieldDescriptor::data(name, offset, width))
    }

    pub fn embedded(
        self,
        name: &str,
        offset: usize,
        count: usize,
        stride: usize,
        element: Vec<FieldDescriptor>,
    ) -> Self {
        self.field(FieldDescriptor::embedded(name, offset, count, stride, element))
    }

    pub fn trailing(
        self,
        name: &str,
        offset: usize,
        length_offset: usize,
        stride: usize,
        element: Vec<FieldDescriptor>,
    ) -> Self {
        self.field(FieldDescriptor::trailing(name, offset, length_offset, stride, element))
    }
}

/// Width of the field reached by `project`, which is never called
#[doc(hidden)]
pub fn field_width_of<T, F>(_project: impl FnOnce(*const T) -> *const F) -> usize {
    std::mem::size_of::<F>()
}

/// Derive a [`LayoutSpec`] from a `#[repr(C)]` struct
///
/// Offsets come from `offset_of!` and the fixed size from `size_of`, so the
/// descriptor cannot drift from the struct. Every field also records its
/// measured width, which validation checks against the declared kind.
///
/// Field kinds: `owning`, `tagged`, `raw`, `fixable`, `data`,
/// `embedded(kind)` for a `[usize; N]` of words, `trailing(len, kind)` for a
/// zero-length word array at the end whose count lives in field `len`, and
/// `trailing(len, data(stride))` for opaque trailing elements.
///
/// ```rust
/// use stampgc::object::ObjectHeader;
/// use stampgc::scan_descriptor;
///
/// #[repr(C)]
/// struct Closure {
///     header: ObjectHeader,
///     entry: *const u8,
///     name: usize,
///     env_count: usize,
///     env: [usize; 0],
/// }
///
/// let layout = scan_descriptor!(Closure => [
///     entry: raw,
///     name: tagged,
///     env_count: data,
///     env: trailing(env_count, tagged),
/// ]);
/// assert_eq!(layout.size, 40);
/// assert_eq!(layout.fields.len(), 4);
/// ```
#[macro_export]
macro_rules! scan_descriptor {
    ($ty:ty => [ $( $field:ident : $kind:ident $( ( $($arg:tt)* ) )? ),* $(,)? ]) => {{
        #[allow(unused_mut)]
        let mut layout = $crate::layout::LayoutSpec::new(::core::mem::size_of::<$ty>());
        $(
            layout.push($crate::__scan_field!($ty, $field, $kind $( ( $($arg)* ) )?));
        )*
        layout
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_width {
    ($ty:ty, $field:ident) => {
        $crate::layout::field_width_of(|p: *const $ty| unsafe { ::core::ptr::addr_of!((*p).$field) })
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __scan_element {
    (owning) => {
        ::std::vec![$crate::layout::FieldDescriptor::owning("element", 0)]
    };
    (tagged) => {
        ::std::vec![$crate::layout::FieldDescriptor::tagged("element", 0)]
    };
    (fixable) => {
        ::std::vec![$crate::layout::FieldDescriptor::fixable("element", 0)]
    };
    (raw) => {
        ::std::vec![$crate::layout::FieldDescriptor::raw("element", 0)]
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __scan_field {
    ($ty:ty, $field:ident, embedded($elem:ident)) => {{
        let width = $crate::__field_width!($ty, $field);
        $crate::layout::FieldDescriptor::embedded(
            stringify!($field),
            ::core::mem::offset_of!($ty, $field),
            width / $crate::util::WORD_SIZE,
            $crate::util::WORD_SIZE,
            $crate::__scan_element!($elem),
        )
        .measured(width)
    }};
    ($ty:ty, $field:ident, trailing($len:ident, data($stride:expr))) => {
        $crate::layout::FieldDescriptor::trailing(
            stringify!($field),
            ::core::mem::offset_of!($ty, $field),
            ::core::mem::offset_of!($ty, $len),
            $stride,
            ::std::vec::Vec::new(),
        )
        .measured($crate::__field_width!($ty, $field))
    };
    ($ty:ty, $field:ident, trailing($len:ident, $elem:ident)) => {
        $crate::layout::FieldDescriptor::trailing(
            stringify!($field),
            ::core::mem::offset_of!($ty, $field),
            ::core::mem::offset_of!($ty, $len),
            $crate::util::WORD_SIZE,
            $crate::__scan_element!($elem),
        )
        .measured($crate::__field_width!($ty, $field))
    };
    ($ty:ty, $field:ident, data) => {{
        let width = $crate::__field_width!($ty, $field);
        $crate::layout::FieldDescriptor::data(
            stringify!($field),
            ::core::mem::offset_of!($ty, $field),
            width,
        )
        .measured(width)
    }};
    ($ty:ty, $field:ident, $kind:ident) => {
        $crate::layout::FieldDescriptor::$kind(stringify!($field), ::core::mem::offset_of!($ty, $field))
            .measured($crate::__field_width!($ty, $field))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectHeader, HEADER_SIZE};

    #[repr(C)]
    struct Pair {
        header: ObjectHeader,
        car: usize,
        flags: u32,
        pad: u32,
        cells: [usize; 3],
    }

    #[test]
    fn test_macro_offsets_and_widths() {
        let layout = crate::scan_descriptor!(Pair => [
            car: owning,
            flags: data,
            cells: embedded(tagged),
        ]);

        assert_eq!(layout.size, std::mem::size_of::<Pair>());
        let car = &layout.fields[0];
        assert_eq!(car.offset, HEADER_SIZE);
        assert_eq!(car.measured_width, Some(WORD_SIZE));

        assert_eq!(layout.fields[1].kind, FieldKind::Data { width: 4 });

        match &layout.fields[2].kind {
            FieldKind::EmbeddedArray { count, stride, element } => {
                assert_eq!(*count, 3);
                assert_eq!(*stride, WORD_SIZE);
                assert_eq!(element[0].kind, FieldKind::Tagged);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_field_widths() {
        assert_eq!(FieldDescriptor::owning("a", 16).end(), 24);
        assert_eq!(FieldDescriptor::data("b", 16, 2).width(), 2);
        assert_eq!(FieldDescriptor::embedded("c", 16, 4, 16, vec![]).width(), 64);
        assert_eq!(FieldDescriptor::trailing("d", 32, 24, 8, vec![]).width(), 0);

        let huge = FieldDescriptor::embedded("e", 16, usize::MAX / 2, 8, vec![]);
        assert_eq!(huge.width(), usize::MAX);
        assert_eq!(huge.end(), usize::MAX);
    }

    #[test]
    fn test_json_shape() {
        let field = FieldDescriptor::trailing("data", 32, 24, 8, vec![FieldDescriptor::tagged("element", 0)]);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["kind"], "trailing_array");
        assert_eq!(json["length_offset"], 24);
        assert_eq!(json["element"][0]["kind"], "tagged");

        let back: FieldDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);

        let raw: FieldDescriptor =
            serde_json::from_str(r#"{"name":"buf","offset":16,"kind":"raw"}"#).unwrap();
        assert_eq!(raw.kind, FieldKind::Raw { fixable: false });
    }
}
