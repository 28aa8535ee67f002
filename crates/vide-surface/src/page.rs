//! Page markup for the webview and the events it posts back.

use crate::document::EditorDocument;
use crate::highlight::{escape, highlight};
use crate::layers::{Layer, LayerStack};
use serde::Deserialize;
use vide_bridge::StreamDescriptor;

/// Events the page posts on the `surface` IPC channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageEvent {
    /// Editor content changed
    Edit { document: u64, text: String },
}

impl PageEvent {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>VisionIDE</title>
<style>
  html, body {
    margin: 0; height: 100%; overflow: hidden;
    font-family: system-ui, sans-serif; background: #1e1e2e;
  }
  #camera {
    position: absolute; inset: 0; width: 100%; height: 100%; object-fit: cover;
    z-index: __Z_VIDEO__; pointer-events: __PE_VIDEO__;
  }
  #overlay {
    position: absolute; inset: 0;
    background: rgba(30, 30, 46, 0.75); backdrop-filter: blur(3px);
    z-index: __Z_OVERLAY__; pointer-events: __PE_OVERLAY__;
  }
  #editor {
    position: absolute; inset: 0; display: flex; flex-direction: column;
    z-index: __Z_EDITOR__; pointer-events: __PE_EDITOR__;
  }
  .doc { position: relative; flex: 1; margin: 0; font: 15px/1.5 ui-monospace, monospace; }
  .doc pre, .doc textarea {
    position: absolute; inset: 0; margin: 0; padding: 12px; border: 0;
    font: inherit; white-space: pre; overflow: auto;
  }
  .doc pre { color: #cdd6f4; pointer-events: none; }
  .doc textarea {
    background: transparent; color: transparent; caret-color: #f5e0dc;
    resize: none; outline: none;
  }
  .doc ul {
    position: absolute; right: 0; bottom: 0; margin: 0; padding: 6px 12px;
    list-style: none; font-size: 12px; color: #f38ba8;
  }
  .tok-keyword { color: #cba6f7; } .tok-string { color: #a6e3a1; }
  .tok-number { color: #fab387; } .tok-comment { color: #6c7086; }
</style>
</head>
<body>
__VIDEO__
<div id="overlay"></div>
<main id="editor">
__DOCUMENTS__
</main>
<script>
(() => {
  'use strict';
  const video = document.getElementById('camera');

  async function bindCamera() {
    const stream = window.visionide ? await window.visionide.requestCamera() : null;
    if (!stream || !stream.mediaStream) {
      video.removeAttribute('src');
      video.srcObject = null;
      return;
    }
    video.srcObject = stream.mediaStream;
  }

  window.__visionideApply = (update) => {
    const doc = document.querySelector(`.doc[data-document="${update.document}"]`);
    if (!doc) { return; }
    if (String(update.revision) !== doc.dataset.revision) {
      doc.querySelector('pre').innerHTML = update.highlighted;
      doc.dataset.revision = String(update.revision);
    }
    const list = doc.querySelector('ul');
    list.replaceChildren(...update.diagnostics.map((d) => {
      const item = document.createElement('li');
      item.textContent = `${d.line}:${d.column} ${d.severity}: ${d.message}`;
      return item;
    }));
  };

  for (const doc of document.querySelectorAll('.doc')) {
    const area = doc.querySelector('textarea');
    const pre = doc.querySelector('pre');
    area.addEventListener('scroll', () => {
      pre.scrollTop = area.scrollTop;
      pre.scrollLeft = area.scrollLeft;
    });
    area.addEventListener('input', () => {
      window.ipc.postMessage(JSON.stringify({
        channel: 'surface', type: 'edit', document: Number(doc.dataset.document), text: area.value,
      }));
    });
  }

  bindCamera();
})();
</script>
</body>
</html>
"#;

fn render_document(doc: &EditorDocument) -> String {
    format!(
        "<section class=\"doc\" data-document=\"{id}\" data-language=\"{lang}\" \
data-revision=\"{rev}\">\
<pre aria-hidden=\"true\">{highlighted}</pre>\
<textarea spellcheck=\"false\" autocomplete=\"off\">{content}</textarea>\
<ul></ul></section>",
        id = doc.id().0,
        lang = escape(doc.language()),
        rev = doc.revision(),
        highlighted = highlight(doc.language(), doc.content()),
        content = escape(doc.content()),
    )
}

fn render_video(stream: Option<&StreamDescriptor>) -> String {
    match stream {
        Some(stream) => format!(
            "<video id=\"camera\" autoplay muted playsinline data-stream=\"{}\"></video>",
            stream.stream_id.0
        ),
        None => "<video id=\"camera\" autoplay muted playsinline></video>".to_string(),
    }
}

/// Render the full surface page. The video element only carries a stream
/// when one was granted.
pub fn render_page<'a>(
    documents: impl IntoIterator<Item = &'a EditorDocument>,
    layers: &LayerStack,
    stream: Option<&StreamDescriptor>,
) -> String {
    let documents: Vec<String> = documents.into_iter().map(render_document).collect();

    let mut page = PAGE_TEMPLATE.to_string();
    for layer in layers.layers() {
        let (z, pe) = match layer {
            Layer::Video => ("__Z_VIDEO__", "__PE_VIDEO__"),
            Layer::Overlay => ("__Z_OVERLAY__", "__PE_OVERLAY__"),
            Layer::Editor => ("__Z_EDITOR__", "__PE_EDITOR__"),
        };
        page = page
            .replace(z, &layer.z_index().to_string())
            .replace(pe, layer.pointer_events());
    }
    page.replace("__VIDEO__", &render_video(stream))
        .replace("__DOCUMENTS__", &documents.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vide_bridge::{FacingMode, StreamId};
    use vide_workers::DocumentId;

    #[test]
    fn test_page_layers_and_documents() {
        let doc = EditorDocument::new(DocumentId(1), "python", "print('<hi>')");
        let page = render_page([&doc], &LayerStack::standard(), None);

        assert!(page.contains("z-index: 0; pointer-events: none;"));
        assert!(page.contains(concat!(
            "#overlay {\n",
            "    position: absolute; inset: 0;\n",
            "    background: rgba(30, 30, 46, 0.75); backdrop-filter: blur(3px);\n",
            "    z-index: 1; pointer-events: none;\n",
            "  }",
        )));
        assert!(page.contains("z-index: 2; pointer-events: auto;"));
        assert!(page.contains(r#"data-document="1" data-language="python""#));
        assert!(page.contains("print(&#39;&lt;hi&gt;&#39;)</textarea>"));
        for placeholder in ["__Z_", "__PE_", "__VIDEO__", "__DOCUMENTS__"] {
            assert!(!page.contains(placeholder), "unreplaced {placeholder}");
        }
    }

    #[test]
    fn test_video_source_only_with_stream() {
        let page = render_page(std::iter::empty(), &LayerStack::standard(), None);
        assert!(page.contains(r#"<video id="camera" autoplay muted playsinline></video>"#));

        let stream = StreamDescriptor {
            stream_id: StreamId(7),
            device_id: None,
            facing_mode: FacingMode::User,
        };
        let page = render_page(std::iter::empty(), &LayerStack::standard(), Some(&stream));
        assert!(page.contains(r#"data-stream="7""#));
    }

    #[test]
    fn test_page_binds_only_the_granted_stream() {
        let page = render_page(std::iter::empty(), &LayerStack::standard(), None);
        assert!(page.contains("video.srcObject = stream.mediaStream;"));
        assert!(!page.contains("getUserMedia"));
    }

    #[test]
    fn test_parse_edit_event() {
        let event =
            PageEvent::parse(r#"{"channel":"surface","type":"edit","document":2,"text":"x"}"#)
                .unwrap();
        assert_eq!(
            event,
            PageEvent::Edit {
                document: 2,
                text: "x".into()
            }
        );
    }
}
