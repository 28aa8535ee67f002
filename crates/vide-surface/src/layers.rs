//! Visual layer ordering and input routing.

use serde::Serialize;

/// Stacked layers of the surface, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Layer {
    /// Live camera feed, full-bleed
    Video,
    /// Translucent blurred scrim over the video
    Overlay,
    /// The editor
    Editor,
}

impl Layer {
    /// CSS z-index for the layer.
    pub fn z_index(self) -> i32 {
        match self {
            Self::Video => 0,
            Self::Overlay => 1,
            Self::Editor => 2,
        }
    }

    /// Whether pointer and keyboard input stops at this layer.
    pub fn intercepts_input(self) -> bool {
        matches!(self, Self::Editor)
    }

    /// Value for the CSS `pointer-events` property.
    pub fn pointer_events(self) -> &'static str {
        if self.intercepts_input() { "auto" } else { "none" }
    }
}

/// Ordered layer stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    /// Video, overlay, editor.
    pub fn standard() -> Self {
        Self {
            layers: vec![Layer::Video, Layer::Overlay, Layer::Editor],
        }
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Topmost layer that receives input.
    pub fn input_target(&self) -> Option<Layer> {
        self.layers
            .iter()
            .rev()
            .copied()
            .find(|layer| layer.intercepts_input())
    }

    /// Layers are strictly increasing in z-index.
    pub fn is_ordered(&self) -> bool {
        self.layers
            .windows(2)
            .all(|pair| pair[0].z_index() < pair[1].z_index())
    }
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_stack_order() {
        let stack = LayerStack::standard();
        assert!(stack.is_ordered());
        assert_eq!(stack.layers().first(), Some(&Layer::Video));
        assert_eq!(stack.layers().last(), Some(&Layer::Editor));
    }

    #[test]
    fn test_overlay_lets_input_through() {
        assert!(!Layer::Overlay.intercepts_input());
        assert_eq!(Layer::Overlay.pointer_events(), "none");
        assert_eq!(LayerStack::standard().input_target(), Some(Layer::Editor));
    }
}
