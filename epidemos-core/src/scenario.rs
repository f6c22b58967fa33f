//! Scenario manifests: deserialized TOML descriptions of a full
//! simulation setup, and the logic for turning specs into live modules.
//!
//! A manifest holds the `[sim]` parameter table plus lists of module
//! specs, each tagged by `type`:
//!
//! ```toml
//! [sim]
//! n_agents = 10000
//! start = 1980.0
//! end = 2010.0
//!
//! [[networks]]
//! type = "embedding"
//!
//! [[demographics]]
//! type = "pregnancy"
//!
//! [[diseases]]
//! type = "hiv"
//! initial = 10
//! beta = { embedding = [0.10, 0.08], maternal = [0.2, 0.0] }
//! ```

use std::path::{Path, PathBuf};

use crate::analyzer::Analyzer;
use crate::connector::{Connector, HivGonorrhea, HivGonorrheaPars};
use crate::demog::{Births, BirthsPars, Deaths, DeathsPars, Demographic, Pregnancy, PregnancyPars};
use crate::disease::{
    Art, ArtPars, Cd4Analyzer, Cholera, CholeraPars, Disease, Ebola, EbolaPars, Gonorrhea,
    GonorrheaPars, Hiv, HivPars, Sir, SirPars,
};
use crate::error::{Error, Result};
use crate::intervention::{Intervention, RoutineVx, RoutineVxPars};
use crate::net::{
    EmbeddingNet, EmbeddingPars, MaternalNet, MaternalPars, MfMsm, MfMsmPars, MfNet, MfPars,
    MsmNet, MsmPars, NetConnector, Network, RandomNet, RandomNetPars,
};
use crate::params::SimParams;
use crate::util;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkSpec {
    Random(RandomNetPars),
    Mf(MfPars),
    Msm(MsmPars),
    Embedding(EmbeddingPars),
    Maternal(MaternalPars),
}

impl NetworkSpec {
    pub fn build(&self) -> Box<dyn Network> {
        match self {
            NetworkSpec::Random(pars) => Box::new(RandomNet::new(pars.clone())),
            NetworkSpec::Mf(pars) => Box::new(MfNet::new(pars.clone())),
            NetworkSpec::Msm(pars) => Box::new(MsmNet::new(pars.clone())),
            NetworkSpec::Embedding(pars) => Box::new(EmbeddingNet::new(pars.clone())),
            NetworkSpec::Maternal(pars) => Box::new(MaternalNet::new(pars.clone())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            NetworkSpec::Random(_) => "random",
            NetworkSpec::Mf(_) => "mf",
            NetworkSpec::Msm(_) => "msm",
            NetworkSpec::Embedding(_) => "embedding",
            NetworkSpec::Maternal(_) => "maternal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetConnectorSpec {
    MfMsm(MfMsmPars),
}

impl NetConnectorSpec {
    pub fn build(&self) -> Box<dyn NetConnector> {
        match self {
            NetConnectorSpec::MfMsm(pars) => Box::new(MfMsm::new(pars.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DemographicSpec {
    Births(BirthsPars),
    Deaths(DeathsPars),
    Pregnancy(PregnancyPars),
}

impl DemographicSpec {
    pub fn build(&self) -> Box<dyn Demographic> {
        match self {
            DemographicSpec::Births(pars) => Box::new(Births::new(pars.clone())),
            DemographicSpec::Deaths(pars) => Box::new(Deaths::new(pars.clone())),
            DemographicSpec::Pregnancy(pars) => Box::new(Pregnancy::new(pars.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiseaseSpec {
    Sir(SirPars),
    Gonorrhea(GonorrheaPars),
    Hiv(HivPars),
    Cholera(CholeraPars),
    Ebola(EbolaPars),
}

impl DiseaseSpec {
    pub fn build(&self) -> Box<dyn Disease> {
        match self {
            DiseaseSpec::Sir(pars) => Box::new(Sir::new(pars.clone())),
            DiseaseSpec::Gonorrhea(pars) => Box::new(Gonorrhea::new(pars.clone())),
            DiseaseSpec::Hiv(pars) => Box::new(Hiv::new(pars.clone())),
            DiseaseSpec::Cholera(pars) => Box::new(Cholera::new(pars.clone())),
            DiseaseSpec::Ebola(pars) => Box::new(Ebola::new(pars.clone())),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DiseaseSpec::Sir(_) => "sir",
            DiseaseSpec::Gonorrhea(_) => "gonorrhea",
            DiseaseSpec::Hiv(_) => "hiv",
            DiseaseSpec::Cholera(_) => "cholera",
            DiseaseSpec::Ebola(_) => "ebola",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterventionSpec {
    RoutineVx(RoutineVxPars),
    Art(ArtPars),
}

impl InterventionSpec {
    pub fn build(&self) -> Box<dyn Intervention> {
        match self {
            InterventionSpec::RoutineVx(pars) => Box::new(RoutineVx::new(pars.clone())),
            InterventionSpec::Art(pars) => Box::new(Art::new(pars.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorSpec {
    HivGonorrhea(HivGonorrheaPars),
}

impl ConnectorSpec {
    pub fn build(&self) -> Box<dyn Connector> {
        match self {
            ConnectorSpec::HivGonorrhea(pars) => Box::new(HivGonorrhea::new(pars.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalyzerSpec {
    Cd4,
}

impl AnalyzerSpec {
    pub fn build(&self) -> Box<dyn Analyzer> {
        match self {
            AnalyzerSpec::Cd4 => Box::new(Cd4Analyzer::new()),
        }
    }
}

/// A complete description of one simulation setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Location of the manifest, for resolving relative data files
    #[serde(default)]
    pub path: PathBuf,
    /// Initial population age structure CSV; uniform 0-100 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_structure_file: Option<PathBuf>,
    #[serde(default)]
    pub sim: SimParams,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub net_connectors: Vec<NetConnectorSpec>,
    #[serde(default)]
    pub demographics: Vec<DemographicSpec>,
    #[serde(default)]
    pub diseases: Vec<DiseaseSpec>,
    #[serde(default)]
    pub interventions: Vec<InterventionSpec>,
    #[serde(default)]
    pub connectors: Vec<ConnectorSpec>,
    #[serde(default)]
    pub analyzers: Vec<AnalyzerSpec>,
}

impl Scenario {
    /// Creates a scenario with default (empty) content for the given
    /// parameters.
    pub fn from_params(params: SimParams) -> Self {
        Scenario {
            sim: params,
            ..Default::default()
        }
    }

    /// Reads a scenario manifest from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut scenario: Scenario = util::deser_struct_from_path(path)?;
        scenario.path = path.to_path_buf();
        info!(
            "loaded scenario \"{}\" from {}",
            scenario.name,
            path.display()
        );
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parses a scenario manifest from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Serializes the scenario back to TOML, as embedded in snapshots.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Builds a ready-to-run simulation from this scenario.
    pub fn build(self) -> Result<crate::sim::Sim> {
        crate::sim::Sim::from_scenario(self)
    }

    /// Resolves a data file path relative to the manifest location.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            return file.to_path_buf();
        }
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
            _ => file.to_path_buf(),
        }
    }

    fn has_network(&self, kind: &str) -> bool {
        self.networks.iter().any(|spec| spec.kind() == kind)
    }

    fn has_disease(&self, kind: &str) -> bool {
        self.diseases.iter().any(|spec| spec.kind() == kind)
    }

    /// Checks cross-references between module specs.
    pub fn validate(&self) -> Result<()> {
        self.sim.validate()?;

        for (i, spec) in self.diseases.iter().enumerate() {
            if self.diseases[..i].iter().any(|other| other.kind() == spec.kind()) {
                return Err(Error::ScenarioError(format!(
                    "duplicate disease module: {}",
                    spec.kind()
                )));
            }
        }
        for (i, spec) in self.networks.iter().enumerate() {
            if self.networks[..i].iter().any(|other| other.kind() == spec.kind()) {
                return Err(Error::ScenarioError(format!(
                    "duplicate network module: {}",
                    spec.kind()
                )));
            }
        }

        for spec in &self.interventions {
            match spec {
                InterventionSpec::RoutineVx(pars) => {
                    if !self.has_disease(&pars.product.disease) {
                        return Err(Error::ScenarioError(format!(
                            "vaccination product targets unknown disease: {}",
                            pars.product.disease
                        )));
                    }
                }
                InterventionSpec::Art(_) => {
                    if !self.has_disease("hiv") {
                        return Err(Error::ScenarioError(
                            "art intervention requires the hiv module".to_string(),
                        ));
                    }
                }
            }
        }
        for spec in &self.connectors {
            let ConnectorSpec::HivGonorrhea(_) = spec;
            if !self.has_disease("hiv") || !self.has_disease("gonorrhea") {
                return Err(Error::ScenarioError(
                    "hiv_gonorrhea connector requires both disease modules".to_string(),
                ));
            }
        }
        for spec in &self.net_connectors {
            let NetConnectorSpec::MfMsm(_) = spec;
            if !self.has_network("mf") || !self.has_network("msm") {
                return Err(Error::ScenarioError(
                    "mf_msm connector requires both the mf and msm networks".to_string(),
                ));
            }
        }
        for spec in &self.analyzers {
            let AnalyzerSpec::Cd4 = spec;
            if !self.has_disease("hiv") {
                return Err(Error::ScenarioError(
                    "cd4 analyzer requires the hiv module".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        name = "hiv_demo"

        [sim]
        n_agents = 500
        start = 1980.0
        end = 1990.0
        rand_seed = 7

        [[networks]]
        type = "embedding"

        [[networks]]
        type = "maternal"

        [[demographics]]
        type = "pregnancy"
        fertility_rate = 80.0

        [[diseases]]
        type = "hiv"
        initial = 10
        beta = { embedding = [0.10, 0.08], maternal = [0.2, 0.0] }

        [[diseases]]
        type = "gonorrhea"
        beta = { embedding = 0.06 }

        [[connectors]]
        type = "hiv_gonorrhea"
    "#;

    #[test]
    fn manifest_round_trip() {
        let scenario = Scenario::from_toml(MANIFEST).unwrap();
        assert_eq!(scenario.name, "hiv_demo");
        assert_eq!(scenario.sim.n_agents, 500);
        assert_eq!(scenario.networks.len(), 2);
        assert_eq!(scenario.diseases.len(), 2);
        match &scenario.diseases[0] {
            DiseaseSpec::Hiv(pars) => {
                assert_eq!(pars.initial, Some(10));
                assert_eq!(pars.beta.len(), 2);
            }
            other => panic!("expected hiv, got {:?}", other),
        }
        match &scenario.diseases[1] {
            DiseaseSpec::Gonorrhea(pars) => {
                let spec = pars.beta.get("embedding").unwrap();
                assert_eq!(spec.pair(), [0.06, 0.06]);
            }
            other => panic!("expected gonorrhea, got {:?}", other),
        }
    }

    #[test]
    fn scenario_survives_a_toml_round_trip() {
        let scenario = Scenario::from_toml(MANIFEST).unwrap();
        let text = scenario.to_toml().unwrap();
        let again = Scenario::from_toml(&text).unwrap();
        assert_eq!(again.name, "hiv_demo");
        assert_eq!(again.sim.rand_seed, 7);
        assert_eq!(again.networks.len(), 2);
        assert_eq!(again.diseases.len(), 2);
        assert_eq!(again.connectors.len(), 1);
    }

    #[test]
    fn dangling_references_are_rejected() {
        let bad = r#"
            [[interventions]]
            type = "routine_vx"
            start = 2005.0
            [interventions.product]
            disease = "measles"
            efficacy = 0.9
        "#;
        assert!(matches!(
            Scenario::from_toml(bad),
            Err(Error::ScenarioError(_))
        ));

        let bad = r#"
            [[connectors]]
            type = "hiv_gonorrhea"
        "#;
        assert!(Scenario::from_toml(bad).is_err());
    }

    #[test]
    fn duplicate_modules_are_rejected() {
        let bad = r#"
            [[diseases]]
            type = "sir"
            [[diseases]]
            type = "sir"
        "#;
        assert!(Scenario::from_toml(bad).is_err());
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let scenario = Scenario::from_toml("").unwrap();
        assert_eq!(scenario.sim.n_agents, 1000);
        assert!(scenario.diseases.is_empty());
    }
}
