use fxdecon_lib::{
    config::presets,
    gather_io::{read_gather_bytes, write_gather_bytes},
    FxDeconParams, Gather, GatherProcessor,
};
use js_sys::{Float32Array, Uint8Array};
use serde::Serialize;
use wasm_bindgen::prelude::*;

type JsResult<T> = std::result::Result<T, String>;

// Set up panic hook for better error messages
fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen(start)]
pub fn start() {
    init_panic_hook();
    fxdecon_lib::init();
}

// Serde-compatible info structs for passing to JavaScript
#[derive(Serialize)]
struct GatherInfoJs {
    num_traces: usize,
    num_samples: usize,
    sample_interval_ms: f64,
    duration_ms: f64,
}

impl From<&Gather> for GatherInfoJs {
    fn from(gather: &Gather) -> Self {
        Self {
            num_traces: gather.num_traces(),
            num_samples: gather.num_samples(),
            sample_interval_ms: gather.sample_interval_ms,
            duration_ms: gather.duration_ms(),
        }
    }
}

#[derive(Serialize)]
struct StatusJs<'a> {
    gather: Option<GatherInfoJs>,
    params: &'a FxDeconParams,
    has_result: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct PresetJs {
    id: usize,
    name: &'static str,
    description: &'static str,
    params: FxDeconParams,
}

fn to_json<T: Serialize>(value: &T) -> JsResult<String> {
    serde_json::to_string(value).map_err(|e| format!("JSON error: {}", e))
}

#[wasm_bindgen]
pub struct WasmFxDecon {
    processor: GatherProcessor,
}

impl Default for WasmFxDecon {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmFxDecon {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        init_panic_hook();

        Self {
            processor: GatherProcessor::new(),
        }
    }

    /// Load a gather from a Float32Array, trace after trace
    #[wasm_bindgen]
    pub fn load_gather_data(
        &mut self,
        num_traces: usize,
        sample_interval_ms: f64,
        data: &Float32Array,
    ) -> JsResult<()> {
        let length = data.length() as usize;
        if num_traces == 0 || length % num_traces != 0 {
            return Err(format!(
                "{} samples cannot be split into {} traces",
                length, num_traces
            ));
        }

        let mut buffer = vec![0.0_f32; length];
        data.copy_to(&mut buffer[..]);

        let num_samples = length / num_traces;
        let traces = buffer
            .chunks_exact(num_samples)
            .map(|trace| trace.to_vec())
            .collect();

        let gather = Gather::new(sample_interval_ms, traces)?;
        self.processor.load_gather(gather)?;
        Ok(())
    }

    /// Read a gather from WAV bytes (e.g., uploaded file)
    #[wasm_bindgen]
    pub fn read_gather_bytes(&mut self, data: Uint8Array) -> JsResult<()> {
        let gather = read_gather_bytes(data.to_vec())?;
        self.processor.load_gather(gather)?;
        Ok(())
    }

    /// Replace all parameters from a JSON object; missing fields take defaults
    #[wasm_bindgen]
    pub fn set_params_json(&mut self, json: &str) -> JsResult<()> {
        let params: FxDeconParams =
            serde_json::from_str(json).map_err(|e| format!("Invalid parameters: {}", e))?;
        self.processor.set_params(params);
        Ok(())
    }

    /// Set a single parameter by name
    #[wasm_bindgen]
    pub fn set_param(&mut self, name: &str, value: &str) -> JsResult<()> {
        Ok(self.processor.set_param(name, value)?)
    }

    /// Current parameters as JSON
    #[wasm_bindgen]
    pub fn get_params_json(&self) -> JsResult<String> {
        to_json(self.processor.params())
    }

    /// Load a parameter preset by name or id
    #[wasm_bindgen]
    pub fn load_preset(&mut self, preset_name: &str) -> JsResult<()> {
        let params = presets::get_preset(preset_name)
            .ok_or_else(|| format!("Unknown preset: {}", preset_name))?;
        self.processor.set_params(params);
        Ok(())
    }

    /// Available presets as JSON
    #[wasm_bindgen]
    pub fn get_presets_json(&self) -> JsResult<String> {
        let presets: Vec<PresetJs> = presets::list_presets()
            .into_iter()
            .map(|p| PresetJs {
                id: p.id,
                name: p.name,
                description: p.description,
                params: p.params,
            })
            .collect();
        to_json(&presets)
    }

    /// Run FX-decon on the loaded gather
    #[wasm_bindgen]
    pub fn process(&mut self) -> JsResult<()> {
        Ok(self.processor.process()?)
    }

    /// Processed gather as a Float32Array, trace after trace
    #[wasm_bindgen]
    pub fn get_result(&self) -> JsResult<Float32Array> {
        let result = self.processor.result().ok_or("No result available")?;
        let flat: Vec<f32> = result.traces.iter().flatten().copied().collect();
        Ok(Float32Array::from(&flat[..]))
    }

    /// Processed gather as 32-bit float WAV bytes
    #[wasm_bindgen]
    pub fn save_result_bytes(&self) -> JsResult<Uint8Array> {
        let result = self.processor.result().ok_or("No result available")?;
        let bytes = write_gather_bytes(result)?;
        Ok(Uint8Array::from(&bytes[..]))
    }

    /// Engine parameters and derived sizes for the loaded gather
    #[wasm_bindgen]
    pub fn describe_engine(&self) -> JsResult<String> {
        Ok(self.processor.describe_engine()?)
    }

    /// Loaded gather, parameters and result state as JSON
    #[wasm_bindgen]
    pub fn get_status_json(&self) -> JsResult<String> {
        let status = StatusJs {
            gather: self.processor.gather().map(GatherInfoJs::from),
            params: self.processor.params(),
            has_result: self.processor.result().is_some(),
            version: fxdecon_lib::VERSION,
        };
        to_json(&status)
    }
}
