use leptos::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlInputElement;

use super::{ControllerHandle, dispatch};
use crate::simulation::{ControllerError, GraphSource};

/// Network sources: a user-supplied JSON file or a freshly generated random network.
#[component]
pub fn GraphUploader(controller: ControllerHandle, error: RwSignal<Option<String>>) -> impl IntoView {
	let on_file = move |ev: leptos::ev::Event| {
		let input: HtmlInputElement = event_target(&ev);
		let Some(file) = input.files().and_then(|files| files.get(0)) else {
			return;
		};
		// Let the same file be picked again after a failed load.
		input.set_value("");
		dispatch(controller, error, move |c| async move {
			let text = JsFuture::from(file.text())
				.await
				.ok()
				.and_then(|value| value.as_string())
				.ok_or_else(|| {
					ControllerError::InvalidGraphFormat(format!("could not read {}", file.name()))
				})?;
			c.load_graph(GraphSource::Upload(text)).await
		});
	};
	let on_random = move |_| {
		dispatch(controller, error, |c| async move {
			c.load_graph(GraphSource::Random).await
		})
	};

	view! {
		<div class="graph-uploader">
			<label class="file-picker">
				<span>"Upload network (.json)"</span>
				<input type="file" accept=".json,application/json" on:change=on_file />
			</label>
			<button on:click=on_random>"Generate random network"</button>
		</div>
	}
}
