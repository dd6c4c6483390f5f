//! Legacy positional command-line form.
//!
//! A fixed two-layer stack (stratum corneum and deeper skin layer) driven
//! by 19, 20, 21 or 23 positional tokens:
//!
//! ```text
//! c_init d_donor d_sc d_dsl k_sc k_dsl app_area lipid_cs dsl_cs
//! h_donor h_sc h_dsl sim_time resolution scaling disc_method mb_method
//! finite_dose [remove_at [replace_after [vd t_half]]] file_tag
//! ```
//!
//! The 20-token form adds `remove_at`, the 21-token form `replace_after`,
//! and the 23-token form `vd` and `t_half` (which enables the
//! pharmacokinetic sink). Non-numeric tokens in numeric slots are parse
//! errors; `finite_dose` takes the literal `yes` or `no`.

use crate::params::{ConfigError, LayerParams, Params, Scaling};
use crate::sim::geometry::DiscMethod;
use crate::sim::matrix::Method;

/// Usage text printed when the binary is invoked without arguments.
pub fn usage() -> String {
    format!(
        "Usage:
  permea <config.json>         run from a JSON configuration file
  permea --template            write a configuration template to dskin_config.json
  permea --version             print the version banner
  permea <positional tokens>   legacy two-layer form:

  c_init d_donor d_sc d_dsl k_sc k_dsl app_area lipid_cs dsl_cs \\
  h_donor h_sc h_dsl sim_time resolution scaling disc_method mb_method \\
  finite_dose [remove_at [replace_after [vd t_half]]] file_tag

  scaling     : mg | ug | ng
  disc_method : EQUIDIST | BK
  mb_method   : {} | {} | {}
  finite_dose : yes | no
",
        Method::DSkin13.as_str(),
        Method::DSkin14.as_str(),
        Method::DSkin15.as_str(),
    )
}

/// Parses and validates the positional token form.
pub fn parse_positional(tokens: &[String]) -> Result<Params, ConfigError> {
    match tokens.len() {
        19 | 20 | 21 | 23 => {}
        n => {
            return Err(ConfigError::Parse(format!(
                "expected 19, 20, 21 or 23 positional arguments, got {n}"
            )));
        }
    }

    let mut params = Params::default();

    params.vehicle.c_init = parse_f64(&tokens[0], "c_init")?;
    params.vehicle.diffusion = parse_f64(&tokens[1], "d_donor")?;
    let d_sc = parse_f64(&tokens[2], "d_sc")?;
    let d_dsl = parse_f64(&tokens[3], "d_dsl")?;
    let k_sc = parse_f64(&tokens[4], "k_sc")?;
    let k_dsl = parse_f64(&tokens[5], "k_dsl")?;
    params.vehicle.app_area = parse_f64(&tokens[6], "app_area")?;
    let lipid_cs = parse_f64(&tokens[7], "lipid_cs")?;
    let dsl_cs = parse_f64(&tokens[8], "dsl_cs")?;
    params.vehicle.thickness_um = parse_u32(&tokens[9], "h_donor")?;
    let h_sc = parse_u32(&tokens[10], "h_sc")?;
    let h_dsl = parse_u32(&tokens[11], "h_dsl")?;
    params.system.sim_time = parse_u32(&tokens[12], "sim_time")?;
    params.system.resolution = parse_u32(&tokens[13], "resolution")?;
    params.log.scaling = Scaling::from_str(&tokens[14])
        .ok_or_else(|| ConfigError::Parse(format!("unknown scaling: {}", tokens[14])))?;
    params.system.disc_method = DiscMethod::from_str(&tokens[15])
        .ok_or_else(|| ConfigError::Parse(format!("unknown disc_method: {}", tokens[15])))?;
    params.system.mb_method = Method::from_str(&tokens[16])
        .ok_or_else(|| ConfigError::Parse(format!("unknown mb_method: {}", tokens[16])))?;
    params.vehicle.finite_dose = parse_yes_no(&tokens[17], "finite_dose")?;

    if tokens.len() >= 20 {
        params.vehicle.remove_at = parse_u32(&tokens[18], "remove_at")?;
    }
    if tokens.len() >= 21 {
        params.vehicle.replace_after = parse_u32(&tokens[19], "replace_after")?;
    }
    if tokens.len() == 23 {
        params.pk.enabled = true;
        params.sink.vd_ml = parse_f64(&tokens[20], "vd")?;
        params.pk.t_half_h = parse_f64(&tokens[21], "t_half")?;
    }

    params.log.tag = tokens[tokens.len() - 1].clone();
    params.vehicle.name = "Donor".to_string();

    params.layers.push(LayerParams {
        name: "SC".to_string(),
        diffusion: d_sc,
        partition: k_sc,
        cross_section: lipid_cs,
        thickness_um: h_sc,
        ..Default::default()
    });
    params.layers.push(LayerParams {
        name: "DSL".to_string(),
        diffusion: d_dsl,
        partition: k_dsl,
        cross_section: dsl_cs,
        thickness_um: h_dsl,
        ..Default::default()
    });

    params.validate()?;
    Ok(params)
}

fn parse_f64(token: &str, name: &str) -> Result<f64, ConfigError> {
    token
        .parse()
        .map_err(|_| ConfigError::Parse(format!("{name}: not a number: {token}")))
}

fn parse_u32(token: &str, name: &str) -> Result<u32, ConfigError> {
    token
        .parse()
        .map_err(|_| ConfigError::Parse(format!("{name}: not a non-negative integer: {token}")))
}

fn parse_yes_no(token: &str, name: &str) -> Result<bool, ConfigError> {
    match token {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(ConfigError::Parse(format!(
            "{name}: expected yes or no: {token}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(extra: &[&str]) -> Vec<String> {
        let mut base: Vec<String> = [
            "1.0", "1.0", "0.5", "0.8", "0.1", "1.0", // c_init, Ds, Ks
            "1.0", "0.1", "1.0", // app_area, cross sections
            "30", "15", "100", // thicknesses
            "120", "2", "ug", "EQUIDIST", "DSkin_1_5", "yes", // sys + dose
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        base.extend(extra.iter().map(|s| s.to_string()));
        base.push("mytag".to_string());
        base
    }

    #[test]
    fn test_base_form_19_tokens() {
        let params = parse_positional(&tokens(&[])).unwrap();
        assert_eq!(params.vehicle.name, "Donor");
        assert_eq!(params.vehicle.thickness_um, 30);
        assert_eq!(params.layers.len(), 2);
        assert_eq!(params.layers[0].name, "SC");
        assert_eq!(params.layers[0].diffusion, 0.5);
        assert_eq!(params.layers[0].partition, 0.1);
        assert_eq!(params.layers[0].cross_section, 0.1);
        assert_eq!(params.layers[1].thickness_um, 100);
        assert_eq!(params.system.sim_time, 120);
        assert_eq!(params.system.resolution, 2);
        assert_eq!(params.log.scaling, Scaling::Ug);
        assert_eq!(params.log.tag, "mytag");
        assert!(params.vehicle.finite_dose);
        assert_eq!(params.vehicle.remove_at, 0);
        assert!(!params.pk.enabled);
    }

    #[test]
    fn test_finite_dose_takes_literal_yes_or_no() {
        let mut toks = tokens(&[]);
        toks[17] = "no".to_string();
        let params = parse_positional(&toks).unwrap();
        assert!(!params.vehicle.finite_dose);

        // Only the exact lowercase literals are accepted.
        for bad in ["1", "0", "true", "false", "Yes", "NO"] {
            let mut toks = tokens(&[]);
            toks[17] = bad.to_string();
            let err = parse_positional(&toks).unwrap_err();
            assert!(
                err.to_string().contains("expected yes or no"),
                "token {bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_20_tokens_add_remove_at() {
        let params = parse_positional(&tokens(&["40"])).unwrap();
        assert_eq!(params.vehicle.remove_at, 40);
        assert_eq!(params.vehicle.replace_after, 0);
    }

    #[test]
    fn test_21_tokens_add_replace_after() {
        let params = parse_positional(&tokens(&["40", "10"])).unwrap();
        assert_eq!(params.vehicle.remove_at, 40);
        assert_eq!(params.vehicle.replace_after, 10);
    }

    #[test]
    fn test_23_tokens_enable_pk() {
        let params = parse_positional(&tokens(&["0", "0", "5.0", "2.5"])).unwrap();
        assert!(params.pk.enabled);
        assert_eq!(params.sink.vd_ml, 5.0);
        assert_eq!(params.pk.t_half_h, 2.5);
    }

    #[test]
    fn test_wrong_token_count_is_rejected() {
        let err = parse_positional(&tokens(&["40", "10", "5.0"])).unwrap_err();
        assert!(err.to_string().contains("positional arguments"));

        let short: Vec<String> = vec!["1.0".into(), "2.0".into()];
        assert!(parse_positional(&short).is_err());
    }

    #[test]
    fn test_non_numeric_token_is_a_parse_error() {
        let mut toks = tokens(&[]);
        toks[2] = "fast".to_string();
        let err = parse_positional(&toks).unwrap_err();
        assert!(err.to_string().contains("d_sc"));
    }

    #[test]
    fn test_unknown_method_is_a_parse_error() {
        let mut toks = tokens(&[]);
        toks[16] = "DSkin_2_0".to_string();
        assert!(parse_positional(&toks).is_err());
    }

    #[test]
    fn test_semantic_violation_is_a_validation_error() {
        let mut toks = tokens(&[]);
        toks[4] = "0.0".to_string(); // k_sc must be > 0
        let err = parse_positional(&toks).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
