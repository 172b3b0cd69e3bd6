use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::ParseError;
use crate::property::Property;
use crate::property::decode_properties;

/// Literal `mID` value of views that have no resource id.
pub const NO_ID: &str = "NO_ID";

/// Category added whenever at least one namespaced property was seen.
pub const MISCELLANEOUS_CATEGORY: &str = "miscellaneous";

/// Margin value used when the device reported no margin for a side.
pub const UNSET_MARGIN: i32 = i32::MIN;

/// Timing value of a node that has not been profiled.
pub const NOT_MEASURED: f64 = -1.0;

/// Index of a node inside its [`ViewTree`](crate::ViewTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Relative cost of a node compared with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfileRating {
    Red,
    Yellow,
    Green,
    #[default]
    None,
}

impl ProfileRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileRating::Red => "RED",
            ProfileRating::Yellow => "YELLOW",
            ProfileRating::Green => "GREEN",
            ProfileRating::None => "NONE",
        }
    }
}

/// One view of a dumped window.
///
/// Geometry and state fields are derived from the well-known properties once,
/// when the node is parsed. Timings, ratings, `view_count` and `filtered` are
/// filled in later by the passes on [`ViewTree`](crate::ViewTree).
#[derive(Debug, Clone, PartialEq)]
pub struct ViewNode {
    /// Fully qualified class name.
    pub name: String,
    /// Hash code exactly as sent by the device (hex, not parsed).
    pub hash_code: String,
    pub id: String,
    /// Properties sorted by name.
    pub properties: Vec<Property>,
    pub categories: BTreeSet<String>,

    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub scroll_x: i32,
    pub scroll_y: i32,
    pub padding_left: i32,
    pub padding_right: i32,
    pub padding_top: i32,
    pub padding_bottom: i32,
    pub margin_left: i32,
    pub margin_right: i32,
    pub margin_top: i32,
    pub margin_bottom: i32,
    pub baseline: i32,
    pub will_not_draw: bool,
    pub has_focus: bool,
    pub has_margins: bool,

    pub measure_time: f64,
    pub layout_time: f64,
    pub draw_time: f64,
    pub measure_rating: ProfileRating,
    pub layout_rating: ProfileRating,
    pub draw_rating: ProfileRating,

    /// Position among siblings, 0-based.
    pub index: usize,
    /// Distance from the root, which has depth 0.
    pub depth: usize,
    /// Subtree size including this node. Only valid after `set_view_count`.
    pub view_count: usize,
    pub filtered: bool,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl ViewNode {
    /// Parses one indentation-stripped `DUMP` line:
    /// `ClassName@hashCode name=len,value...`.
    pub fn parse(data: &str) -> Result<Self, ParseError> {
        if data.is_empty() {
            return Err(ParseError::EmptyLine);
        }
        let (name, rest) = data
            .split_once('@')
            .ok_or(ParseError::MissingClassDelimiter)?;
        let (hash_code, blob) = rest.split_once(' ').unwrap_or((rest, ""));
        if hash_code.is_empty() {
            return Err(ParseError::MissingHashCode);
        }
        let properties = decode_properties(blob)?;
        Ok(Self::from_properties(name, hash_code, properties))
    }

    fn from_properties(name: &str, hash_code: &str, properties: Vec<Property>) -> Self {
        let mut categories: BTreeSet<String> = properties
            .iter()
            .filter_map(|p| p.category())
            .map(str::to_string)
            .collect();
        if !categories.is_empty() {
            categories.insert(MISCELLANEOUS_CATEGORY.to_string());
        }

        let mut node = Self {
            name: name.to_string(),
            hash_code: hash_code.to_string(),
            id: NO_ID.to_string(),
            properties,
            categories,
            left: 0,
            top: 0,
            width: 0,
            height: 0,
            scroll_x: 0,
            scroll_y: 0,
            padding_left: 0,
            padding_right: 0,
            padding_top: 0,
            padding_bottom: 0,
            margin_left: UNSET_MARGIN,
            margin_right: UNSET_MARGIN,
            margin_top: UNSET_MARGIN,
            margin_bottom: UNSET_MARGIN,
            baseline: 0,
            will_not_draw: false,
            has_focus: false,
            has_margins: false,
            measure_time: NOT_MEASURED,
            layout_time: NOT_MEASURED,
            draw_time: NOT_MEASURED,
            measure_rating: ProfileRating::None,
            layout_rating: ProfileRating::None,
            draw_rating: ProfileRating::None,
            index: 0,
            depth: 0,
            view_count: 0,
            filtered: false,
            parent: None,
            children: Vec::new(),
        };

        if let Some(id) = node.property("mID") {
            node.id = id.to_string();
        }
        node.left = node.int_property("mLeft", "layout:mLeft", 0);
        node.top = node.int_property("mTop", "layout:mTop", 0);
        node.width = node.int_property("getWidth()", "layout:getWidth()", 0);
        node.height = node.int_property("getHeight()", "layout:getHeight()", 0);
        node.scroll_x = node.int_property("mScrollX", "scrolling:mScrollX", 0);
        node.scroll_y = node.int_property("mScrollY", "scrolling:mScrollY", 0);
        node.padding_left = node.int_property("mPaddingLeft", "padding:mPaddingLeft", 0);
        node.padding_right = node.int_property("mPaddingRight", "padding:mPaddingRight", 0);
        node.padding_top = node.int_property("mPaddingTop", "padding:mPaddingTop", 0);
        node.padding_bottom = node.int_property("mPaddingBottom", "padding:mPaddingBottom", 0);
        node.margin_left =
            node.int_property("layout_leftMargin", "layout:layout_leftMargin", UNSET_MARGIN);
        node.margin_right =
            node.int_property("layout_rightMargin", "layout:layout_rightMargin", UNSET_MARGIN);
        node.margin_top =
            node.int_property("layout_topMargin", "layout:layout_topMargin", UNSET_MARGIN);
        node.margin_bottom =
            node.int_property("layout_bottomMargin", "layout:layout_bottomMargin", UNSET_MARGIN);
        node.baseline = node.int_property("getBaseline()", "layout:getBaseline()", 0);
        node.will_not_draw = node.bool_property("willNotDraw()", "drawing:willNotDraw()", false);
        node.has_focus = node.bool_property("hasFocus()", "focus:hasFocus()", false);

        node.has_margins = node.margin_left != UNSET_MARGIN
            && node.margin_right != UNSET_MARGIN
            && node.margin_top != UNSET_MARGIN
            && node.margin_bottom != UNSET_MARGIN;

        node
    }

    /// Looks up a property value by exact name.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|i| self.properties[i].value.as_str())
    }

    fn property_or_namespaced(&self, name: &str, namespaced: &str) -> Option<&str> {
        self.property(name).or_else(|| self.property(namespaced))
    }

    fn int_property(&self, name: &str, namespaced: &str, default: i32) -> i32 {
        self.property_or_namespaced(name, namespaced)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn bool_property(&self, name: &str, namespaced: &str, default: bool) -> bool {
        self.property_or_namespaced(name, namespaced)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }

    /// Class name without its package (`Button` for `android.widget.Button`).
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_profiled(&self) -> bool {
        self.measure_time != NOT_MEASURED
    }
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.hash_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class_hash_and_id() {
        let node = ViewNode::parse("android.widget.Button@a1b2 mID=12,id/ok_button").unwrap();
        assert_eq!(node.name, "android.widget.Button");
        assert_eq!(node.hash_code, "a1b2");
        assert_eq!(node.id, "id/ok_button");
        assert_eq!(node.short_name(), "Button");
        assert_eq!(node.to_string(), "android.widget.Button@a1b2");
    }

    #[test]
    fn test_parse_geometry_from_plain_names() {
        let node = ViewNode::parse(
            "android.view.View@1 mLeft=2,10 mTop=2,20 getWidth()=3,300 getHeight()=3,400 mID=5,NO_ID",
        )
        .unwrap();
        assert_eq!((node.left, node.top, node.width, node.height), (10, 20, 300, 400));
        assert!(node.categories.is_empty());
    }

    #[test]
    fn test_parse_falls_back_to_namespaced_names() {
        let node = ViewNode::parse(
            "android.view.View@1 layout:mLeft=1,5 layout:getWidth()=2,50 padding:mPaddingTop=1,3 focus:hasFocus()=4,true mID=5,NO_ID",
        )
        .unwrap();
        assert_eq!(node.left, 5);
        assert_eq!(node.width, 50);
        assert_eq!(node.padding_top, 3);
        assert!(node.has_focus);
    }

    #[test]
    fn test_plain_name_wins_over_namespaced() {
        let node =
            ViewNode::parse("android.view.View@1 layout:mLeft=1,5 mLeft=1,7 mID=5,NO_ID").unwrap();
        assert_eq!(node.left, 7);
    }

    #[test]
    fn test_margins_unset_by_default() {
        let node = ViewNode::parse("android.view.View@1 mID=5,NO_ID").unwrap();
        assert_eq!(node.margin_left, UNSET_MARGIN);
        assert!(!node.has_margins);
    }

    #[test]
    fn test_has_margins_requires_all_four() {
        let partial = ViewNode::parse(
            "android.view.View@1 layout_leftMargin=1,0 layout_rightMargin=1,0 layout_topMargin=1,0",
        )
        .unwrap();
        assert!(!partial.has_margins);
        assert_eq!(partial.margin_left, 0);

        let full = ViewNode::parse(
            "android.view.View@1 layout_leftMargin=1,0 layout_rightMargin=1,0 layout_topMargin=1,0 layout:layout_bottomMargin=1,4",
        )
        .unwrap();
        assert!(full.has_margins);
        assert_eq!(full.margin_bottom, 4);
    }

    #[test]
    fn test_unparsable_int_uses_default() {
        let node = ViewNode::parse("android.view.View@1 mLeft=3,abc mID=5,NO_ID").unwrap();
        assert_eq!(node.left, 0);
    }

    #[test]
    fn test_booleans() {
        let node =
            ViewNode::parse("android.view.View@1 willNotDraw()=4,TRUE hasFocus()=5,false").unwrap();
        assert!(node.will_not_draw);
        assert!(!node.has_focus);
    }

    // Characterization: the miscellaneous bucket is added whenever any
    // namespaced property exists, even though nothing is filed under it.
    #[test]
    fn test_categories_include_miscellaneous_when_namespaced() {
        let node =
            ViewNode::parse("android.view.View@1 layout:mLeft=1,0 drawing:mAlpha=3,1.0 mID=5,NO_ID")
                .unwrap();
        let categories: Vec<_> = node.categories.iter().map(String::as_str).collect();
        assert_eq!(categories, vec!["drawing", "layout", MISCELLANEOUS_CATEGORY]);
    }

    #[test]
    fn test_missing_id_defaults_to_no_id() {
        let node = ViewNode::parse("android.view.View@1 mLeft=1,0").unwrap();
        assert_eq!(node.id, NO_ID);
    }

    #[test]
    fn test_line_without_properties() {
        let node = ViewNode::parse("android.view.View@1f").unwrap();
        assert_eq!(node.hash_code, "1f");
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(ViewNode::parse(""), Err(ParseError::EmptyLine));
        assert_eq!(
            ViewNode::parse("android.view.View mID=5,NO_ID"),
            Err(ParseError::MissingClassDelimiter)
        );
        assert_eq!(
            ViewNode::parse("android.view.View@ mID=5,NO_ID"),
            Err(ParseError::MissingHashCode)
        );
    }

    #[test]
    fn test_timings_start_unmeasured() {
        let node = ViewNode::parse("android.view.View@1 mID=5,NO_ID").unwrap();
        assert_eq!(node.measure_time, NOT_MEASURED);
        assert!(!node.is_profiled());
        assert_eq!(node.draw_rating, ProfileRating::None);
    }
}
