use std::path::{Path, PathBuf};

use crate::config::{SearchConfiguration, ToleranceUnit};
use crate::constants::DEFAULT_CONVERTER_EXECUTABLE;
use crate::engine::SearchEngine;
use crate::pipeline::stage::{EngineJob, Stage, StageOp};

/// Filesystem context shared by all jobs of a session
///
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Session working directory, one subdirectory per engine
    pub work_dir: PathBuf,
    /// Target protein database in FASTA format
    pub target_database: PathBuf,
    /// Optional decoy database for engines without built-in decoy handling
    pub decoy_database: Option<PathBuf>,
}

impl JobContext {
    fn engine_dir(&self, engine: SearchEngine) -> PathBuf {
        self.work_dir.join(engine.tag())
    }
}

fn spectrum_stem(spectrum_file: &Path) -> String {
    spectrum_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "spectra".to_string())
}

fn process_stage(
    description: String,
    program: PathBuf,
    args: Vec<String>,
    working_dir: PathBuf,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    retain_outputs: bool,
) -> Stage {
    Stage {
        description,
        op: StageOp::Process { program, args },
        working_dir,
        inputs,
        outputs,
        retain_outputs,
    }
}

/// Comet parameter file with the session's search settings
///
fn comet_params(config: &SearchConfiguration) -> String {
    let (tolerance_units, tolerance_value) = match config.precursor_tolerance.unit {
        // 0 = amu, 2 = ppm
        ToleranceUnit::Da => (0, config.precursor_tolerance.value),
        ToleranceUnit::Ppm => (2, config.precursor_tolerance.value),
    };
    format!(
        concat!(
            "# comet parameter file\n",
            "peptide_mass_tolerance = {}\n",
            "peptide_mass_units = {}\n",
            "fragment_bin_tol = {}\n",
            "allowed_missed_cleavage = {}\n",
            "decoy_search = 0\n",
            "output_txtfile = 1\n",
            "output_pepxmlfile = 0\n",
        ),
        tolerance_value,
        tolerance_units,
        config.fragment_tolerance.value,
        config.max_missed_cleavages,
    )
}

/// Two-pass Comet job: target database first, decoy database second when one
/// is provided. Both passes share one parameter file.
///
pub fn comet_job(
    config: &SearchConfiguration,
    context: &JobContext,
    spectrum_file: &Path,
) -> EngineJob {
    let engine = SearchEngine::Comet;
    let dir = context.engine_dir(engine);
    let stem = spectrum_stem(spectrum_file);
    let params = dir.join("comet.params");
    let executable = config.executable_for(engine);

    let target_base = dir.join(format!("{}_comet_target", stem));
    let result_path = target_base.with_extension("txt");
    let mut stages = vec![process_stage(
        format!("comet target search of {}", stem),
        executable.clone(),
        vec![
            format!("-P{}", params.display()),
            format!("-D{}", context.target_database.display()),
            format!("-N{}", target_base.display()),
            spectrum_file.display().to_string(),
        ],
        dir.clone(),
        vec![spectrum_file.to_path_buf(), context.target_database.clone()],
        vec![result_path.clone()],
        true,
    )];

    let decoy_result_path = context.decoy_database.as_ref().map(|decoy_database| {
        let decoy_base = dir.join(format!("{}_comet_decoy", stem));
        let decoy_result = decoy_base.with_extension("txt");
        stages.push(process_stage(
            format!("comet decoy search of {}", stem),
            executable.clone(),
            vec![
                format!("-P{}", params.display()),
                format!("-D{}", decoy_database.display()),
                format!("-N{}", decoy_base.display()),
                spectrum_file.display().to_string(),
            ],
            dir.clone(),
            vec![spectrum_file.to_path_buf(), decoy_database.clone()],
            vec![decoy_result.clone()],
            true,
        ));
        decoy_result
    });

    EngineJob {
        engine,
        spectrum_file: spectrum_file.to_path_buf(),
        setup_files: vec![(params, comet_params(config))],
        stages,
        result_path,
        decoy_result_path,
    }
}

/// X!Tandem driver document pointing one run at one database
///
fn tandem_input_xml(
    config: &SearchConfiguration,
    spectrum_file: &Path,
    taxonomy_file: &Path,
    output_file: &Path,
) -> String {
    let (tolerance_unit, tolerance_value) = match config.precursor_tolerance.unit {
        ToleranceUnit::Da => ("Daltons", config.precursor_tolerance.value),
        ToleranceUnit::Ppm => ("ppm", config.precursor_tolerance.value),
    };
    format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<bioml>\n",
            "  <note type=\"input\" label=\"list path, taxonomy information\">{}</note>\n",
            "  <note type=\"input\" label=\"protein, taxon\">session</note>\n",
            "  <note type=\"input\" label=\"spectrum, path\">{}</note>\n",
            "  <note type=\"input\" label=\"spectrum, parent monoisotopic mass error plus\">{}</note>\n",
            "  <note type=\"input\" label=\"spectrum, parent monoisotopic mass error minus\">{}</note>\n",
            "  <note type=\"input\" label=\"spectrum, parent monoisotopic mass error units\">{}</note>\n",
            "  <note type=\"input\" label=\"spectrum, fragment monoisotopic mass error\">{}</note>\n",
            "  <note type=\"input\" label=\"spectrum, fragment monoisotopic mass error units\">Daltons</note>\n",
            "  <note type=\"input\" label=\"scoring, maximum missed cleavage sites\">{}</note>\n",
            "  <note type=\"input\" label=\"output, path\">{}</note>\n",
            "  <note type=\"input\" label=\"output, path hashing\">no</note>\n",
            "</bioml>\n",
        ),
        taxonomy_file.display(),
        spectrum_file.display(),
        tolerance_value,
        tolerance_value,
        tolerance_unit,
        config.fragment_tolerance.value,
        config.max_missed_cleavages,
        output_file.display(),
    )
}

fn tandem_taxonomy_xml(database: &Path) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\"?>\n",
            "<bioml label=\"x! taxon-to-file matching list\">\n",
            "  <taxon label=\"session\">\n",
            "    <file format=\"peptide\" URL=\"{}\" />\n",
            "  </taxon>\n",
            "</bioml>\n",
        ),
        database.display(),
    )
}

/// Two-pass X!Tandem job driven by generated input and taxonomy documents
///
pub fn xtandem_job(
    config: &SearchConfiguration,
    context: &JobContext,
    spectrum_file: &Path,
) -> EngineJob {
    let engine = SearchEngine::XTandem;
    let dir = context.engine_dir(engine);
    let stem = spectrum_stem(spectrum_file);
    let executable = config.executable_for(engine);

    let target_taxonomy = dir.join("taxonomy_target.xml");
    let target_input = dir.join(format!("{}_target_input.xml", stem));
    let result_path = dir.join(format!("{}_xtandem_target.xml", stem));
    let mut setup_files = vec![
        (
            target_taxonomy.clone(),
            tandem_taxonomy_xml(&context.target_database),
        ),
        (
            target_input.clone(),
            tandem_input_xml(config, spectrum_file, &target_taxonomy, &result_path),
        ),
    ];
    let mut stages = vec![process_stage(
        format!("xtandem target search of {}", stem),
        executable.clone(),
        vec![target_input.display().to_string()],
        dir.clone(),
        vec![spectrum_file.to_path_buf(), target_input.clone()],
        vec![result_path.clone()],
        true,
    )];

    let decoy_result_path = context.decoy_database.as_ref().map(|decoy_database| {
        let decoy_taxonomy = dir.join("taxonomy_decoy.xml");
        let decoy_input = dir.join(format!("{}_decoy_input.xml", stem));
        let decoy_result = dir.join(format!("{}_xtandem_decoy.xml", stem));
        setup_files.push((decoy_taxonomy.clone(), tandem_taxonomy_xml(decoy_database)));
        setup_files.push((
            decoy_input.clone(),
            tandem_input_xml(config, spectrum_file, &decoy_taxonomy, &decoy_result),
        ));
        stages.push(process_stage(
            format!("xtandem decoy search of {}", stem),
            executable.clone(),
            vec![decoy_input.display().to_string()],
            dir.clone(),
            vec![spectrum_file.to_path_buf(), decoy_input.clone()],
            vec![decoy_result.clone()],
            true,
        ));
        decoy_result
    });

    EngineJob {
        engine,
        spectrum_file: spectrum_file.to_path_buf(),
        setup_files,
        stages,
        result_path,
        decoy_result_path,
    }
}

/// MS-GF+ job: search to mzIdentML, then export to TSV with the bundled
/// converter class. The mzIdentML intermediate is cleaned up after export.
///
pub fn msgf_job(
    config: &SearchConfiguration,
    context: &JobContext,
    spectrum_file: &Path,
) -> EngineJob {
    let engine = SearchEngine::MsGf;
    let dir = context.engine_dir(engine);
    let stem = spectrum_stem(spectrum_file);
    let jar = config.executable_for(engine);

    let search_pass = |label: &str, database: &Path| -> (Vec<Stage>, PathBuf) {
        let mzid = dir.join(format!("{}_msgf_{}.mzid", stem, label));
        let tsv = dir.join(format!("{}_msgf_{}.tsv", stem, label));
        let stages = vec![
            process_stage(
                format!("msgf {} search of {}", label, stem),
                PathBuf::from("java"),
                vec![
                    "-jar".to_string(),
                    jar.display().to_string(),
                    "-s".to_string(),
                    spectrum_file.display().to_string(),
                    "-d".to_string(),
                    database.display().to_string(),
                    "-t".to_string(),
                    String::from(config.precursor_tolerance),
                    "-tda".to_string(),
                    "0".to_string(),
                    "-o".to_string(),
                    mzid.display().to_string(),
                ],
                dir.clone(),
                vec![spectrum_file.to_path_buf(), database.to_path_buf()],
                vec![mzid.clone()],
                false,
            ),
            process_stage(
                format!("msgf {} tsv export of {}", label, stem),
                PathBuf::from("java"),
                vec![
                    "-cp".to_string(),
                    jar.display().to_string(),
                    "edu.ucsd.msjava.ui.MzIDToTsv".to_string(),
                    "-i".to_string(),
                    mzid.display().to_string(),
                    "-o".to_string(),
                    tsv.display().to_string(),
                ],
                dir.clone(),
                vec![mzid],
                vec![tsv.clone()],
                true,
            ),
        ];
        (stages, tsv)
    };

    let (mut stages, result_path) = search_pass("target", &context.target_database);
    let decoy_result_path = context.decoy_database.as_ref().map(|decoy_database| {
        let (decoy_stages, decoy_result) = search_pass("decoy", decoy_database);
        stages.extend(decoy_stages);
        decoy_result
    });

    EngineJob {
        engine,
        spectrum_file: spectrum_file.to_path_buf(),
        setup_files: vec![],
        stages,
        result_path,
        decoy_result_path,
    }
}

/// Crux job: convert the spectrum file, search, re-rank with percolator and
/// rename the re-ranked output into place. Percolator brings its own
/// q-values, so no decoy pass is assembled.
///
pub fn crux_job(
    config: &SearchConfiguration,
    context: &JobContext,
    spectrum_file: &Path,
) -> EngineJob {
    let engine = SearchEngine::Crux;
    let dir = context.engine_dir(engine);
    let stem = spectrum_stem(spectrum_file);
    let executable = config.executable_for(engine);
    let converter = config
        .converter_executable
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERTER_EXECUTABLE));

    let converted = dir.join(format!("{}.converted.mgf", stem));
    let search_output = dir.join("tide-search.target.txt");
    let percolator_output = dir.join("percolator.target.txt");
    let result_path = dir.join(format!("{}_crux_percolator.tsv", stem));

    let stages = vec![
        process_stage(
            format!("convert {} for crux", stem),
            converter,
            vec![
                spectrum_file.display().to_string(),
                "--mgf".to_string(),
                "--outfile".to_string(),
                converted.display().to_string(),
                "-o".to_string(),
                dir.display().to_string(),
            ],
            dir.clone(),
            vec![spectrum_file.to_path_buf()],
            vec![converted.clone()],
            false,
        ),
        process_stage(
            format!("crux search of {}", stem),
            executable.clone(),
            vec![
                "tide-search".to_string(),
                "--overwrite".to_string(),
                "T".to_string(),
                "--output-dir".to_string(),
                dir.display().to_string(),
                converted.display().to_string(),
                context.target_database.display().to_string(),
            ],
            dir.clone(),
            vec![converted.clone(), context.target_database.clone()],
            vec![search_output.clone()],
            false,
        ),
        process_stage(
            format!("crux percolator re-ranking of {}", stem),
            executable,
            vec![
                "percolator".to_string(),
                "--overwrite".to_string(),
                "T".to_string(),
                "--output-dir".to_string(),
                dir.display().to_string(),
                search_output.display().to_string(),
            ],
            dir.clone(),
            vec![search_output.clone()],
            vec![percolator_output.clone()],
            false,
        ),
        Stage {
            description: format!("rename percolator output of {}", stem),
            op: StageOp::Rename {
                from: percolator_output.clone(),
                to: result_path.clone(),
            },
            working_dir: dir.clone(),
            inputs: vec![percolator_output],
            outputs: vec![result_path.clone()],
            retain_outputs: true,
        },
    ];

    EngineJob {
        engine,
        spectrum_file: spectrum_file.to_path_buf(),
        setup_files: vec![],
        stages,
        result_path,
        decoy_result_path: None,
    }
}

/// Assembles the job for one engine and one spectrum file
///
pub fn job_for(
    engine: SearchEngine,
    config: &SearchConfiguration,
    context: &JobContext,
    spectrum_file: &Path,
) -> EngineJob {
    match engine {
        SearchEngine::XTandem => xtandem_job(config, context, spectrum_file),
        SearchEngine::Comet => comet_job(config, context, spectrum_file),
        SearchEngine::MsGf => msgf_job(config, context, spectrum_file),
        SearchEngine::Crux => crux_job(config, context, spectrum_file),
    }
}
