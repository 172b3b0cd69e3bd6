//! Serializable views of client results for `--json` output.

use serde::Serialize;
use viewserver_core::NodeId;
use viewserver_core::ProfileRating;
use viewserver_core::Property;
use viewserver_core::ViewTree;
use viewserver_ipc::ViewServerInfo;
use viewserver_ipc::Window;

#[derive(Debug, Serialize)]
pub struct WindowDto {
    pub hash_code: String,
    pub title: String,
    pub focused_placeholder: bool,
}

impl From<&Window> for WindowDto {
    fn from(window: &Window) -> Self {
        Self {
            hash_code: window.encode(),
            title: window.title().to_string(),
            focused_placeholder: window.is_focused_sentinel(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WindowListDto {
    pub device: String,
    pub server: ViewServerInfo,
    pub windows: Vec<WindowDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused_window: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BoundsDto {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Serialize)]
pub struct TimingDto {
    pub measure_ms: f64,
    pub layout_ms: f64,
    pub draw_ms: f64,
    pub measure_rating: ProfileRating,
    pub layout_rating: ProfileRating,
    pub draw_rating: ProfileRating,
}

#[derive(Debug, Serialize)]
pub struct ViewNodeDto {
    pub name: String,
    pub hash_code: String,
    pub id: String,
    pub bounds: BoundsDto,
    pub view_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_focus: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub filtered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingDto>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    pub children: Vec<ViewNodeDto>,
}

impl ViewNodeDto {
    /// Builds the nested view of the subtree at `id`.
    pub fn from_tree(tree: &ViewTree, id: NodeId, with_properties: bool) -> Self {
        let node = tree.node(id);
        let timing = node.is_profiled().then(|| TimingDto {
            measure_ms: node.measure_time,
            layout_ms: node.layout_time,
            draw_ms: node.draw_time,
            measure_rating: node.measure_rating,
            layout_rating: node.layout_rating,
            draw_rating: node.draw_rating,
        });
        Self {
            name: node.name.clone(),
            hash_code: node.hash_code.clone(),
            id: node.id.clone(),
            bounds: BoundsDto {
                left: node.left,
                top: node.top,
                width: node.width,
                height: node.height,
            },
            view_count: node.view_count,
            has_focus: node.has_focus,
            filtered: node.filtered,
            timing,
            properties: if with_properties {
                node.properties.clone()
            } else {
                Vec::new()
            },
            children: node
                .children()
                .iter()
                .map(|child| Self::from_tree(tree, *child, with_properties))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DumpDto {
    pub device: String,
    pub window: WindowDto,
    pub profiled: bool,
    pub root: ViewNodeDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchEvent {
    WindowsChanged,
    FocusChanged,
}

#[derive(Debug, Serialize)]
pub struct WatchEventDto<'a> {
    pub event: WatchEvent,
    pub device: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_dto() {
        let dto = WindowDto::from(&Window::new("emulator-5554", "Launcher", 0x41a2));
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["hash_code"], "41a2");
        assert_eq!(json["title"], "Launcher");
        assert_eq!(json["focused_placeholder"], false);
    }

    #[test]
    fn test_node_dto_nests_children() {
        let mut tree = ViewTree::from_lines([
            "a.Root@1 mID=7,id/root getWidth()=3,100",
            " a.Leaf@2 mID=5,NO_ID",
        ])
        .unwrap()
        .unwrap();
        tree.set_view_count();
        let dto = ViewNodeDto::from_tree(&tree, tree.root(), false);
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["id"], "id/root");
        assert_eq!(json["bounds"]["width"], 100);
        assert_eq!(json["view_count"], 2);
        assert_eq!(json["children"][0]["hash_code"], "2");
        assert!(json.get("timing").is_none());
        assert!(json.get("properties").is_none());
    }

    #[test]
    fn test_watch_event_names() {
        let dto = WatchEventDto {
            event: WatchEvent::FocusChanged,
            device: "emulator-5554",
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["event"], "focus-changed");
    }
}
