use crate::node::NodeId;
use crate::node::ProfileRating;
use crate::tree::ViewTree;

/// Share of the siblings' total time at or above which a child is rated red.
pub const RED_THRESHOLD: f64 = 0.8;
/// Share of the siblings' total time at or above which a child is rated yellow.
pub const YELLOW_THRESHOLD: f64 = 0.5;

/// Parses one `PROFILE` response line into `(measure, layout, draw)`
/// milliseconds.
///
/// Returns `None` for the failure markers (`-1 -1 -1`, `DONE.`) and for any
/// line that does not hold three integer nanosecond values.
pub fn parse_profile_line(line: &str) -> Option<(f64, f64, f64)> {
    let line = line.trim_end();
    if line.eq_ignore_ascii_case("-1 -1 -1") || line.eq_ignore_ascii_case("DONE.") {
        return None;
    }
    let mut fields = line.split(' ').map(|f| f.parse::<i64>().ok());
    let measure = fields.next()??;
    let layout = fields.next()??;
    let draw = fields.next()??;
    Some((nanos_to_millis(measure), nanos_to_millis(layout), nanos_to_millis(draw)))
}

fn nanos_to_millis(nanos: i64) -> f64 {
    (nanos as f64 / 1000.0) / 1000.0
}

fn rate(time: f64, total: f64) -> ProfileRating {
    let ratio = time / total;
    if ratio >= RED_THRESHOLD {
        ProfileRating::Red
    } else if ratio >= YELLOW_THRESHOLD {
        ProfileRating::Yellow
    } else {
        ProfileRating::Green
    }
}

impl ViewTree {
    /// Consumes one profile line per node of the subtree at `from`, in the
    /// pre-order the tree was dumped in.
    ///
    /// Timings are applied only if every node received a valid line; a
    /// failure marker, a malformed line or running out of lines leaves the
    /// tree untouched and returns `false`.
    pub fn load_profile_data<I>(&mut self, from: NodeId, lines: &mut I) -> bool
    where
        I: Iterator<Item = String>,
    {
        let order = self.preorder(from);
        let mut timings = Vec::with_capacity(order.len());
        for _ in &order {
            let Some(line) = lines.next() else {
                return false;
            };
            match parse_profile_line(&line) {
                Some(timing) => timings.push(timing),
                None => return false,
            }
        }

        for (id, (measure, layout, draw)) in order.into_iter().zip(timings) {
            let node = self.node_mut(id);
            node.measure_time = measure;
            node.layout_time = layout;
            node.draw_time = draw;
        }
        true
    }

    /// Rates every node with more than one child against its siblings, per
    /// timing dimension. Nodes without siblings keep [`ProfileRating::None`].
    pub fn set_profile_ratings(&mut self) {
        for parent in 0..self.len() {
            let children = self.node(NodeId(parent)).children().to_vec();
            if children.len() <= 1 {
                continue;
            }

            let (mut total_measure, mut total_layout, mut total_draw) = (0.0, 0.0, 0.0);
            for child in &children {
                let node = self.node(*child);
                total_measure += node.measure_time;
                total_layout += node.layout_time;
                total_draw += node.draw_time;
            }

            for child in children {
                let node = self.node_mut(child);
                node.measure_rating = rate(node.measure_time, total_measure);
                node.layout_rating = rate(node.layout_time, total_layout);
                node.draw_rating = rate(node.draw_time, total_draw);
            }
        }
    }
}
