//! Render Patch Example
//!
//! A sequenced subtractive voice rendered offline to a WAV file:
//! SEQ-3 → Quantizer → VCO → VCF → VCA → Delay, with an ADSR on the
//! filter cutoff and the VCA, all gated by the sequencer.
//!
//! Run with: cargo run --example render_patch -- [out.wav] [seconds]

use polyrack::prelude::*;

/// Copy an output onto an input, as a cable does between frames
fn cable(from: &AnyModule, output: usize, to: &mut AnyModule, input: usize) {
    let port = *from.io().output(output);
    let dst = to.io_mut().input_mut(input);
    dst.connect(port.channels());
    dst.write_voltages(port.voltages());
}

fn main() -> polyrack::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "render_patch.wav".to_string());
    let seconds: f32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(4.0);

    let settings = EngineSettings::new(48000.0).with_seed(2024);
    let registry = ModuleRegistry::with_builtins();

    let mut seq = registry.create("SEQ3", &settings)?;
    let mut quantizer = registry.create("Quantizer", &settings)?;
    let mut vco = registry.create("VCO", &settings)?;
    let mut env = registry.create("ADSR", &settings)?;
    let mut vcf = registry.create("VCF", &settings)?;
    let mut vca = registry.create("VCA", &settings)?;
    let mut delay = registry.create("Delay", &settings)?;

    // Outputs the patch reads from
    seq.io_mut().output_mut(Seq3::GATES_OUTPUT).connect(1);
    seq.io_mut().output_mut(Seq3::ROW1_OUTPUT).connect(1);
    quantizer.io_mut().output_mut(Quantizer::PITCH_OUTPUT).connect(1);
    vco.io_mut().output_mut(Vco::SAW_OUTPUT).connect(1);
    env.io_mut().output_mut(Adsr::ENVELOPE_OUTPUT).connect(1);
    vcf.io_mut().output_mut(Vcf::LPF_OUTPUT).connect(1);
    vca.io_mut().output_mut(Vca::OUT1_OUTPUT).connect(1);
    delay.io_mut().output_mut(Delay::MIX_OUTPUT).connect(1);

    // A minor pentatonic riff, a gate on every other step
    let riff = [0.0, 3.0, 5.0, 7.0, 10.0, 7.0, 5.0, 12.0];
    for (step, semitones) in riff.iter().enumerate() {
        seq.io_mut().set_param(Seq3::ROW1_PARAM + step, 1.0 + semitones / 12.0);
    }
    if let AnyModule::Seq3(s) = &mut seq {
        for step in 0..8 {
            s.set_gate(step, step % 2 == 0 || step == 7);
        }
    }
    seq.io_mut().set_param(Seq3::CLOCK_PARAM, 3.0);
    if let AnyModule::Quantizer(q) = &mut quantizer {
        q.set_enabled_notes([
            true, false, false, true, false, true, false, true, false, false, true, false,
        ]);
    }

    vco.io_mut().set_param(Vco::FREQ_PARAM, -24.0);
    env.io_mut().set_param(Adsr::ATTACK_PARAM, 0.05);
    env.io_mut().set_param(Adsr::DECAY_PARAM, 0.4);
    env.io_mut().set_param(Adsr::SUSTAIN_PARAM, 0.3);
    env.io_mut().set_param(Adsr::RELEASE_PARAM, 0.3);
    vcf.io_mut().set_param(Vcf::FREQ_PARAM, 0.35);
    vcf.io_mut().set_param(Vcf::FREQ_CV_PARAM, 0.6);
    vcf.io_mut().set_param(Vcf::RES_PARAM, 0.6);
    delay.io_mut().set_param(Delay::TIME_PARAM, 0.6);
    delay.io_mut().set_param(Delay::FEEDBACK_PARAM, 0.4);
    delay.io_mut().set_param(Delay::MIX_PARAM, 0.3);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: settings.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;

    let frames = (seconds * settings.sample_rate) as usize;
    let mut frame = ProcessArgs::new(settings.sample_rate);
    let mut peak = 0.0_f32;
    for _ in 0..frames {
        seq.process(&frame);
        cable(&seq, Seq3::ROW1_OUTPUT, &mut quantizer, Quantizer::PITCH_INPUT);
        quantizer.process(&frame);
        cable(&quantizer, Quantizer::PITCH_OUTPUT, &mut vco, Vco::PITCH_INPUT);
        cable(&seq, Seq3::GATES_OUTPUT, &mut env, Adsr::GATE_INPUT);
        vco.process(&frame);
        env.process(&frame);

        cable(&vco, Vco::SAW_OUTPUT, &mut vcf, Vcf::IN_INPUT);
        cable(&env, Adsr::ENVELOPE_OUTPUT, &mut vcf, Vcf::FREQ_INPUT);
        vcf.process(&frame);

        cable(&vcf, Vcf::LPF_OUTPUT, &mut vca, Vca::IN1_INPUT);
        cable(&env, Adsr::ENVELOPE_OUTPUT, &mut vca, Vca::LIN1_INPUT);
        vca.process(&frame);

        cable(&vca, Vca::OUT1_OUTPUT, &mut delay, Delay::IN_INPUT);
        delay.process(&frame);

        // ±10 V full scale
        let v = delay.io().output(Delay::MIX_OUTPUT).get_voltage(0);
        peak = peak.max(v.abs());
        writer.write_sample(v / 10.0)?;
        frame = frame.next();
    }
    writer.finalize()?;

    println!("Rendered {:.1} s to {}", seconds, path);
    println!("Peak level: {:.2} V", peak);
    Ok(())
}
