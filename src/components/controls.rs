use leptos::prelude::*;
use log::debug;

use super::{ControllerHandle, dispatch};
use crate::simulation::{Knob, ParameterUpdate, Phase, RunStatus, SimulationParameters};

fn can_start(status: &RunStatus) -> bool {
	status.has_graph && !status.phase.is_active() && status.phase != Phase::Finished
}

fn play_label(status: &RunStatus) -> &'static str {
	if status.current_day > 0 { "Resume" } else { "Play" }
}

/// Push one knob to the controller and mirror the value it actually kept.
fn set_knob(
	controller: ControllerHandle,
	parameters: RwSignal<SimulationParameters>,
	knob: Knob,
	raw: &str,
) {
	let Ok(value) = raw.trim().parse::<f64>() else {
		debug!("ignoring non-numeric input for {}", knob.label());
		return;
	};
	let kept = controller.try_with_value(|c| {
		c.update_parameters(&ParameterUpdate::from((knob, value)));
		c.parameters()
	});
	if let Some(kept) = kept {
		parameters.set(kept);
	}
}

#[component]
fn KnobInput(
	controller: ControllerHandle,
	parameters: RwSignal<SimulationParameters>,
	knob: Knob,
) -> impl IntoView {
	let range = knob.range();
	view! {
		<label class="knob">
			<span>{knob.label()}</span>
			<input
				type="number"
				min=range.start().to_string()
				max=range.end().to_string()
				step=knob.step().to_string()
				prop:value=move || parameters.get().get(knob).to_string()
				on:change=move |ev| set_knob(controller, parameters, knob, &event_target_value(&ev))
			/>
		</label>
	}
}

/// Run buttons, playback speed and transition probabilities.
#[component]
pub fn ControlPanel(
	controller: ControllerHandle,
	status: RwSignal<RunStatus>,
	error: RwSignal<Option<String>>,
) -> impl IntoView {
	let initial = controller
		.try_with_value(|c| c.parameters())
		.unwrap_or_default();
	let parameters = RwSignal::new(initial);
	let speed = Knob::Speed.range();

	let on_play = move |_| dispatch(controller, error, |c| async move { c.start().await });
	let on_pause = move |_| dispatch(controller, error, |c| async move { c.pause().await });
	let on_step = move |_| dispatch(controller, error, |c| async move { c.step().await });
	let on_reset = move |_| {
		controller.try_with_value(|c| c.reset());
		error.set(None);
	};
	let on_hard_reset = move |_| dispatch(controller, error, |c| async move { c.hard_reset().await });

	view! {
		<div class="control-panel">
			<div class="buttons">
				<button on:click=on_play disabled=move || !can_start(&status.get())>
					{move || play_label(&status.get())}
				</button>
				<button on:click=on_pause disabled=move || status.get().phase != Phase::Running>
					"Pause"
				</button>
				<button on:click=on_step disabled=move || !can_start(&status.get())>
					"Step"
				</button>
				<button on:click=on_reset disabled=move || !status.get().has_graph>
					"Reset"
				</button>
				<button on:click=on_hard_reset>"Hard reset"</button>
			</div>

			<label class="knob speed">
				<span>
					{Knob::Speed.label()} ": " {move || format!("{:.1}x", parameters.get().simulation_speed)}
				</span>
				<input
					type="range"
					min=speed.start().to_string()
					max=speed.end().to_string()
					step=Knob::Speed.step().to_string()
					prop:value=move || parameters.get().simulation_speed.to_string()
					on:input=move |ev| {
						set_knob(controller, parameters, Knob::Speed, &event_target_value(&ev))
					}
				/>
			</label>

			<details class="probabilities">
				<summary>"Transition probabilities"</summary>
				{Knob::PROBABILITIES
					.into_iter()
					.map(|knob| view! { <KnobInput controller=controller parameters=parameters knob=knob /> })
					.collect_view()}
			</details>
		</div>
	}
}
