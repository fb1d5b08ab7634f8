//! Conversions between typed cell values and [`AttrValue`].

use crate::service::{AttrValue, ElementRef, Point, Size};

pub trait FromAttrValue: Sized {
    /// Convert from the untyped value, handing it back on a type mismatch.
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue>;
}

pub trait IntoAttrValue {
    fn into_attr(self) -> AttrValue;
}

impl FromAttrValue for Point {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::Point(point) => Ok(point),
            other => Err(other),
        }
    }
}

impl IntoAttrValue for Point {
    fn into_attr(self) -> AttrValue {
        AttrValue::Point(self)
    }
}

impl FromAttrValue for Size {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::Size(size) => Ok(size),
            other => Err(other),
        }
    }
}

impl IntoAttrValue for Size {
    fn into_attr(self) -> AttrValue {
        AttrValue::Size(self)
    }
}

impl FromAttrValue for String {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::String(text) => Ok(text),
            other => Err(other),
        }
    }
}

impl IntoAttrValue for String {
    fn into_attr(self) -> AttrValue {
        AttrValue::String(self)
    }
}

impl FromAttrValue for bool {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::Bool(flag) => Ok(flag),
            other => Err(other),
        }
    }
}

impl IntoAttrValue for bool {
    fn into_attr(self) -> AttrValue {
        AttrValue::Bool(self)
    }
}

impl FromAttrValue for ElementRef {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::Element(element) => Ok(element),
            other => Err(other),
        }
    }
}

impl FromAttrValue for Vec<ElementRef> {
    fn from_attr(value: AttrValue) -> Result<Self, AttrValue> {
        match value {
            AttrValue::Elements(elements) => Ok(elements),
            other => Err(other),
        }
    }
}
