use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::process;

use serde::Serialize;

use dagsearch::dag::Dag;
use dagsearch::dict::Dictionary;

use super::{CliError, ModelPaths, Resources};

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

/// Shape of a lattice before and after conversion to a DAG.
#[derive(Debug, Serialize)]
pub struct DagInfo {
    pub frames: i32,
    pub lattice_nodes: usize,
    pub lattice_edges: usize,
    pub nodes: usize,
    pub links: usize,
    pub unreachable_nodes: usize,
    pub bypass_links: usize,
    pub root: String,
    pub exit: String,
    /// Set when a filler exit word was replaced by `</s>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_exit: Option<String>,
    pub max_lm_ops: u64,
}

pub fn dag_info(res: &Resources, lattice_path: &Path) -> Result<DagInfo, CliError> {
    let lattice = res.read_lattice(lattice_path)?;
    let mut dag = Dag::build(&lattice, &res.vocab, &res.build_options())?;
    let links = dag.link_count();
    let unreachable_nodes = dag.prune_unreachable();
    dag.bypass_fillers(&res.scorer())?;
    let word = |id| res.vocab.display(id).to_string();
    Ok(DagInfo {
        frames: dag.frames(),
        lattice_nodes: lattice.nodes.len(),
        lattice_edges: lattice.edges.len(),
        nodes: dag.node_count(),
        links,
        unreachable_nodes,
        bypass_links: dag.bypass_count(),
        root: word(dag.node(dag.root()).word),
        exit: word(dag.node(dag.exit()).word),
        original_exit: dag.original_exit_word().map(word),
        max_lm_ops: dag.max_lm_ops(),
    })
}

pub fn info_cmd(models: &ModelPaths<'_>, lattice_path: &Path, json: bool) {
    let res = die!(Resources::load(models), "Error loading models: {}");
    let info = die!(dag_info(&res, lattice_path), "Error: {}");
    if json {
        let text = die!(serde_json::to_string_pretty(&info), "Error: {}");
        println!("{text}");
        return;
    }
    println!("Frames:           {}", info.frames);
    println!("Lattice nodes:    {}", info.lattice_nodes);
    println!("Lattice edges:    {}", info.lattice_edges);
    println!("DAG nodes:        {}", info.nodes);
    println!("DAG links:        {}", info.links);
    println!("Unreachable:      {}", info.unreachable_nodes);
    println!("Bypass links:     {}", info.bypass_links);
    match &info.original_exit {
        Some(orig) => println!("Root/exit:        {} / {} (was {orig})", info.root, info.exit),
        None => println!("Root/exit:        {} / {}", info.root, info.exit),
    }
    println!("LM op budget:     {}", info.max_lm_ops);
}

/// Build the DAG, drop nodes that cannot reach the exit, and write the result
/// back out in lattice format.
pub fn rewrite(res: &Resources, lattice_path: &Path, output: &Path) -> Result<usize, CliError> {
    let lattice = res.read_lattice(lattice_path)?;
    let mut dag = Dag::build(&lattice, &res.vocab, &res.build_options())?;
    let unreachable = dag.prune_unreachable();
    let rewritten = dag.to_lattice(Some(res.logmath.base()));

    let wrap = |source| CliError::Write {
        path: output.to_path_buf(),
        source,
    };
    let mut w = BufWriter::new(File::create(output).map_err(wrap)?);
    rewritten.write(&mut w, &res.vocab).map_err(wrap)?;
    w.flush().map_err(wrap)?;
    Ok(unreachable)
}

pub fn rewrite_cmd(models: &ModelPaths<'_>, lattice_path: &Path, output: &Path) {
    let res = die!(Resources::load(models), "Error loading models: {}");
    let unreachable = die!(rewrite(&res, lattice_path, output), "Error: {}");
    eprintln!("Wrote {} ({unreachable} unreachable nodes dropped)", output.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DICT: &str = "A\nB\nC\n";
    const FILLERS: &str = "<sil>\n";

    // Node 3 (C) has no way out, node 4 (<sil>) ends the utterance.
    const LATTICE: &str = "\
Frames 20
Nodes 5 (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)
0 <s> 0 2 4
1 A 3 8 10
2 B 9 14 16
3 C 9 12 14
4 <sil> 15 19 19
Initial 0
Final 4
BestSegAscr 1 (NODEID ENDFRAME ASCORE)
4 19 -7
Edges (FROM-NODEID TO-NODEID ASCORE)
0 1 -10
1 2 -20
1 3 -25
2 4 -30
End
";

    fn setup(dir: &Path) -> Resources {
        let dict = dir.join("d.dic");
        let fillers = dir.join("d.filler");
        fs::write(&dict, DICT).unwrap();
        fs::write(&fillers, FILLERS).unwrap();
        fs::write(dir.join("u.lat"), LATTICE).unwrap();
        let models = ModelPaths {
            dict: &dict,
            fillers: Some(&fillers),
            lm: None,
            settings: None,
        };
        Resources::load(&models).unwrap()
    }

    #[test]
    fn test_info_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let res = setup(tmp.path());
        let info = dag_info(&res, &tmp.path().join("u.lat")).unwrap();
        assert_eq!(info.frames, 20);
        assert_eq!(info.lattice_nodes, 5);
        assert_eq!(info.nodes, 5);
        assert_eq!(info.links, 4);
        assert_eq!(info.unreachable_nodes, 1);
        assert_eq!(info.root, "<s>");
        assert_eq!(info.exit, "</s>");
        assert_eq!(info.original_exit.as_deref(), Some("<sil>"));
    }

    #[test]
    fn test_rewrite_drops_dead_ends() {
        let tmp = tempfile::tempdir().unwrap();
        let res = setup(tmp.path());
        let out = tmp.path().join("pruned.lat");
        let dropped = rewrite(&res, &tmp.path().join("u.lat"), &out).unwrap();
        assert_eq!(dropped, 1);

        let again = res.read_lattice(&out).unwrap();
        assert_eq!(again.frames, 20);
        assert_eq!(again.nodes.len(), 5);
        assert_eq!(again.edges.len(), 3);
        assert_eq!(again.log_base, Some(res.logmath.base()));
    }
}
