//! Widget descriptions for a host dashboard

use crate::measure::MeasureLayout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Collector name under which memory data is reported.
pub const MEMORY_COLLECTOR_NAME: &str = "memory_details";

/// How a host should render one piece of collected data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    pub icon: String,
    pub title: String,
    pub widget: String,
    /// Path into the collected data the widget reads from.
    pub map: String,
    pub default: String,
}

pub type Widgets = BTreeMap<String, WidgetDescriptor>;

pub(crate) fn memory_widgets(layout: MeasureLayout) -> Widgets {
    let (widget, map) = match layout {
        MeasureLayout::Timeline => ("PhpDebugBar.Widgets.TimelineWidget", MEMORY_COLLECTOR_NAME.to_string()),
        MeasureLayout::ByLabel => (
            "PhpDebugBar.Widgets.HtmlVariableListWidget",
            format!("{MEMORY_COLLECTOR_NAME}.measures"),
        ),
    };

    let mut widgets = Widgets::new();
    widgets.insert(
        MEMORY_COLLECTOR_NAME.to_string(),
        WidgetDescriptor {
            icon: "tasks".to_string(),
            title: "Memory".to_string(),
            widget: widget.to_string(),
            map,
            default: "{}".to_string(),
        },
    );
    widgets
}
