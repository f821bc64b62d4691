//! Whole-program orchestration.
//!
//! The main module is parsed first; every `@import` it records is resolved
//! and loaded depth-first before the importer is considered done. Modules
//! are then run through the per-module passes, concatenated into one
//! combined tree (imported modules in first-resolution order, main module
//! last) and run through the combined passes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Ast, StmtId, StmtKind};
use crate::context::Context;
use crate::diagnostic::DEFAULT_MAX_ERRORS;
use crate::error::CoreError;
use crate::fold::ConstFold;
use crate::irgen::IrGen;
use crate::module::Module;
use crate::parser::ImportRequest;
use crate::pass::{Pass, PassId, PassManager};
use crate::resolve::ImportResolver;
use crate::span::{ModuleId, ModuleLoc};

/// Environment variable holding extra import directories.
pub const SEARCH_PATH_VAR: &str = "KESTREL_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub search_paths: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub max_errors: usize,
    /// Print rendered diagnostics to stderr as they are reported.
    pub echo_diagnostics: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            search_paths: Vec::new(),
            extensions: vec!["ks".to_string()],
            max_errors: DEFAULT_MAX_ERRORS,
            echo_diagnostics: false,
        }
    }
}

impl CompilerOptions {
    /// `includes`, then the entries of `env_paths` (a `KESTREL_PATH` style
    /// list), then `library_root`.
    pub fn search_path(
        includes: &[PathBuf],
        env_paths: Option<&OsStr>,
        library_root: &Path,
    ) -> Result<Vec<PathBuf>, CoreError> {
        if !library_root.is_dir() {
            return Err(CoreError::MissingLibraryRoot(library_root.to_path_buf()));
        }
        let mut paths = includes.to_vec();
        if let Some(env_paths) = env_paths {
            paths.extend(std::env::split_paths(env_paths).filter(|p| !p.as_os_str().is_empty()));
        }
        paths.push(library_root.to_path_buf());
        Ok(paths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationArtifact {
    /// Every module in combination order; the main module is last.
    pub modules: Vec<PathBuf>,
    /// Lexemes of the main module.
    pub token_dump: String,
    /// Parse tree of the main module, before any pass ran.
    pub tree_dump: String,
    /// Combined tree after the combined passes.
    pub combined_dump: String,
    /// Diagnostics (warnings) reported during a successful run.
    pub diagnostics: Vec<String>,
}

#[derive(Debug)]
pub struct Compiler {
    ctx: Context,
    ast: Ast,
    resolver: ImportResolver,
    modules: HashMap<ModuleId, Module>,
    main: Option<ModuleId>,
    module_stack: Vec<ModuleId>,
    module_order: Vec<ModuleId>,
    module_passes: PassManager,
    combined_passes: PassManager,
    combined: Option<StmtId>,
}

impl Compiler {
    /// A compiler with the default pipelines: `const-fold` per module and
    /// `irgen` over the combined tree.
    pub fn new(options: &CompilerOptions) -> Self {
        let mut compiler = Compiler::bare(options);
        compiler.add_module_pass(ConstFold::new());
        compiler.add_combined_pass(IrGen::new());
        compiler
    }

    /// A compiler with empty pipelines.
    pub fn bare(options: &CompilerOptions) -> Self {
        Compiler {
            ctx: Context::new(options.max_errors).with_echo(options.echo_diagnostics),
            ast: Ast::new(),
            resolver: ImportResolver::new(options.search_paths.clone(), options.extensions.clone()),
            modules: HashMap::new(),
            main: None,
            module_stack: Vec::new(),
            module_order: Vec::new(),
            module_passes: PassManager::new(),
            combined_passes: PassManager::new(),
            combined: None,
        }
    }

    pub fn add_module_pass<P: Pass>(&mut self, pass: P) -> PassId {
        self.module_passes.add(&mut self.ctx, pass)
    }

    pub fn add_combined_pass<P: Pass>(&mut self, pass: P) -> PassId {
        self.combined_passes.add(&mut self.ctx, pass)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn resolver(&self) -> &ImportResolver {
        &self.resolver
    }

    pub fn module_passes(&self) -> &PassManager {
        &self.module_passes
    }

    pub fn combined_passes(&self) -> &PassManager {
        &self.combined_passes
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    pub fn main_module(&self) -> Option<&Module> {
        self.main.and_then(|id| self.modules.get(&id))
    }

    /// Imported modules in first-resolution order, main module last.
    pub fn combination_order(&self) -> Vec<ModuleId> {
        self.module_order.iter().copied().chain(self.main).collect()
    }

    pub fn combined_root(&self) -> Option<StmtId> {
        self.combined
    }

    /// Reads, parses and loads the imports of the main module at `path`.
    pub fn parse_main(&mut self, path: impl AsRef<Path>) -> Result<ModuleId, CoreError> {
        let path = path.as_ref();
        let source_io = |source| CoreError::SourceIo {
            path: path.to_path_buf(),
            source,
        };
        let path = path.canonicalize().map_err(source_io)?;
        let source = fs::read_to_string(&path).map_err(|source| CoreError::SourceIo {
            path: path.clone(),
            source,
        })?;
        self.load_module(path, Arc::from(source), true)
    }

    /// Like [`Compiler::parse_main`] for source text that is not read from
    /// `path`. The text is handed to the diagnostic engine up front.
    pub fn parse_main_source(
        &mut self,
        path: impl Into<PathBuf>,
        source: impl Into<Arc<str>>,
    ) -> Result<ModuleId, CoreError> {
        let path = path.into();
        let path = path.canonicalize().unwrap_or(path);
        let source = source.into();
        let id = self.ctx.sources.add_path(&path);
        self.ctx.sources.set_text(id, source.clone());
        self.load_module(path, source, true)
    }

    fn load_module(&mut self, path: PathBuf, source: Arc<str>, is_main: bool) -> Result<ModuleId, CoreError> {
        let id = self.ctx.sources.add_path(&path);
        let mut module = Module::new(id, path, source, is_main);
        module.tokenize(&mut self.ctx)?;
        module.parse_tokens(&mut self.ctx, &mut self.ast)?;
        let requests = module.imports().to_vec();
        self.modules.insert(id, module);
        if is_main {
            self.main = Some(id);
        }

        self.module_stack.push(id);
        let resolved = self.resolve_imports(id, &requests);
        self.module_stack.pop();
        resolved?;

        if !is_main {
            self.module_order.push(id);
        }
        debug!(module = %id, imports = requests.len(), main = is_main, "module loaded");
        Ok(id)
    }

    fn resolve_imports(&mut self, importer: ModuleId, requests: &[ImportRequest]) -> Result<(), CoreError> {
        let importer_dir = self
            .modules
            .get(&importer)
            .and_then(|module| module.path().parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        for (index, request) in requests.iter().enumerate() {
            let Some(path) = self.resolver.resolve_import(&request.name, &importer_dir) else {
                self.ctx
                    .error(request.loc, format!("could not find module '{}'", request.name));
                return Err(CoreError::Import {
                    name: request.name.clone(),
                    reason: "not found in the search path".to_string(),
                });
            };

            let target = match self.ctx.sources.id_of(&path) {
                Some(known) if self.module_stack.contains(&known) => {
                    return Err(self.import_cycle(known, request.loc));
                }
                Some(known) if self.modules.contains_key(&known) => {
                    debug!(import = %request.name, module = %known, "reusing loaded module");
                    known
                }
                _ => {
                    let source = fs::read_to_string(&path).map_err(|source| CoreError::SourceIo {
                        path: path.clone(),
                        source,
                    })?;
                    self.load_module(path, Arc::from(source), false)?
                }
            };
            if let Some(module) = self.modules.get_mut(&importer) {
                module.imports_mut()[index].resolved = Some(target);
            }
        }
        Ok(())
    }

    fn import_cycle(&mut self, target: ModuleId, loc: ModuleLoc) -> CoreError {
        let start = self
            .module_stack
            .iter()
            .position(|id| *id == target)
            .unwrap_or_default();
        let chain: Vec<String> = self.module_stack[start..]
            .iter()
            .chain(std::iter::once(&target))
            .map(|id| {
                self.ctx
                    .sources
                    .path(*id)
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
        self.ctx
            .error(loc, format!("import cycle detected: {}", chain.join(" -> ")));
        CoreError::ImportCycle { chain }
    }

    /// Runs the per-module pipeline over every loaded module.
    pub fn run_module_passes(&mut self) -> Result<(), CoreError> {
        for id in self.combination_order() {
            let Some(module) = self.modules.get_mut(&id) else {
                continue;
            };
            module.execute_passes(
                &mut self.ctx,
                &mut self.ast,
                &mut self.module_passes,
                &[&self.combined_passes],
            )?;
        }
        Ok(())
    }

    /// Concatenates the top-level statements of every module into one
    /// top-level block.
    pub fn combine_all_modules(&mut self) -> StmtId {
        let mut stmts = Vec::new();
        for id in self.combination_order() {
            let Some(root) = self.modules.get(&id).and_then(Module::root) else {
                continue;
            };
            match &self.ast[root].kind {
                StmtKind::Block(block) => stmts.extend(block.stmts.iter().copied()),
                _ => stmts.push(Some(root)),
            }
        }
        let loc = self
            .main
            .map_or(ModuleLoc::INVALID, |main| ModuleLoc::new(main, 0));
        let combined = self.ast.create_block(loc, stmts, true);
        debug!(modules = self.modules.len(), "modules combined");
        self.combined = Some(combined);
        combined
    }

    /// Runs the combined pipeline, combining first if needed.
    pub fn run_combined_passes(&mut self) -> Result<(), CoreError> {
        let mut root = match self.combined {
            Some(root) => Some(root),
            None => Some(self.combine_all_modules()),
        };
        let result = self.combined_passes.run_with_peers(
            &mut self.ctx,
            &mut self.ast,
            &mut root,
            &[&self.module_passes],
        );
        self.combined = root;
        result
    }

    pub fn dump_tokens(&self, id: ModuleId) -> Option<String> {
        self.modules.get(&id).map(Module::dump_tokens)
    }

    pub fn dump_tree(&self, id: ModuleId) -> Option<String> {
        self.modules.get(&id).map(|module| module.dump_tree(&self.ast))
    }

    pub fn dump_combined(&self) -> Option<String> {
        self.combined.map(|root| self.ast.dump(Some(root)))
    }

    fn finish(mut self, main: ModuleId) -> Result<CompilationArtifact, CoreError> {
        let token_dump = self.dump_tokens(main).unwrap_or_default();
        let tree_dump = self.dump_tree(main).unwrap_or_default();
        self.run_module_passes()?;
        self.combine_all_modules();
        self.run_combined_passes()?;
        let modules = self
            .combination_order()
            .into_iter()
            .filter_map(|id| self.modules.get(&id).map(|module| module.path().to_path_buf()))
            .collect();
        Ok(CompilationArtifact {
            modules,
            token_dump,
            tree_dump,
            combined_dump: self.dump_combined().unwrap_or_default(),
            diagnostics: self.ctx.diagnostics.take_emitted(),
        })
    }
}

/// Runs the whole pipeline on the file at `path`.
pub fn compile(path: impl AsRef<Path>, options: &CompilerOptions) -> Result<CompilationArtifact, CoreError> {
    let mut compiler = Compiler::new(options);
    let main = compiler.parse_main(path)?;
    compiler.finish(main)
}

/// Runs the whole pipeline on in-memory source labelled `path`.
pub fn compile_source(
    path: impl Into<PathBuf>,
    source: &str,
    options: &CompilerOptions,
) -> Result<CompilationArtifact, CoreError> {
    let mut compiler = Compiler::new(options);
    let main = compiler.parse_main_source(path, source)?;
    compiler.finish(main)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::PassCx;
    use std::ffi::OsString;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(&path, text).expect("write");
        path
    }

    fn options(search_paths: &[&Path]) -> CompilerOptions {
        CompilerOptions {
            search_paths: search_paths.iter().map(|p| p.to_path_buf()).collect(),
            ..CompilerOptions::default()
        }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn compiles_a_declaration_end_to_end() {
        let artifact =
            compile_source("main.ks", "let x: i32 = 1 + 2;", &CompilerOptions::default()).unwrap();
        assert_eq!(
            artifact.token_dump,
            "[0] LET\n[4] IDEN(\"x\")\n[5] COL\n[7] IDEN(\"i32\")\n[11] ASSN\n\
             [13] INT(1)\n[15] ADD\n[17] INT(2)\n[18] COLS\n"
        );
        assert_eq!(
            artifact.tree_dump,
            "Block [top]\n\
             \x20 VarDecl\n\
             \x20   Var x\n\
             \x20     type: Type\n\
             \x20       Simple IDEN(\"i32\")\n\
             \x20     value: Expr ADD\n\
             \x20       lhs: Simple INT(1)\n\
             \x20       rhs: Simple INT(2)\n"
        );
        assert!(artifact.combined_dump.contains("value: Simple INT(3)"));
        assert_eq!(file_names(&artifact.modules), vec!["main.ks"]);
        assert!(artifact.diagnostics.is_empty());
    }

    #[test]
    fn imports_load_depth_first_and_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lib = dir.path().join("lib");
        write(&lib, "std/io.ks", "let put = fn(c: i32) {};");
        write(dir.path(), "util.ks", "let io = @import(\"std/io\");\nlet twice = 2 * 2;");
        let main = write(
            dir.path(),
            "main.ks",
            "let util = @import(\"./util\");\nlet io = @import(\"std/io\");\nlet answer = 40 + 2;",
        );

        let mut compiler = Compiler::new(&options(&[&lib]));
        let main_id = compiler.parse_main(&main).unwrap();
        let order: Vec<PathBuf> = compiler
            .combination_order()
            .iter()
            .filter_map(|id| compiler.module(*id).map(|m| m.path().to_path_buf()))
            .collect();
        assert_eq!(file_names(&order), vec!["io.ks", "util.ks", "main.ks"]);

        let main_module = compiler.main_module().unwrap();
        assert_eq!(main_module.id(), main_id);
        assert!(main_module.is_main());
        let resolved: Vec<Option<ModuleId>> =
            main_module.imports().iter().map(|i| i.resolved).collect();
        assert_eq!(resolved, vec![Some(compiler.combination_order()[1]), Some(compiler.combination_order()[0])]);

        compiler.run_module_passes().unwrap();
        let combined = compiler.combine_all_modules();
        compiler.run_combined_passes().unwrap();
        assert_eq!(compiler.combined_root(), Some(combined));

        let dump = compiler.dump_combined().unwrap();
        let put = dump.find("Var put").unwrap();
        let twice = dump.find("Var twice").unwrap();
        let answer = dump.find("Var answer").unwrap();
        assert!(put < twice && twice < answer, "{dump}");
        assert!(dump.contains("value: Simple INT(42)"), "{dump}");
        assert!(dump.contains("value: Simple INT(4)"), "{dump}");
        assert_eq!(compiler.combined_passes().get::<IrGen>(compiler.context()).map(IrGen::declarations), Some(6));
    }

    #[test]
    fn import_cycles_fail_the_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "b.ks", "let a = @import(\"./a\");");
        let a = write(dir.path(), "a.ks", "let b = @import(\"./b\");");

        let mut compiler = Compiler::new(&CompilerOptions::default());
        let err = compiler.parse_main(&a).unwrap_err();
        let CoreError::ImportCycle { chain } = err else {
            panic!("expected an import cycle, got {err:?}");
        };
        assert_eq!(chain.len(), 3);
        assert!(chain[0].ends_with("a.ks") && chain[1].ends_with("b.ks") && chain[2].ends_with("a.ks"));
        assert!(compiler.combined_root().is_none());

        let emitted = compiler.context().diagnostics.emitted();
        assert_eq!(emitted.len(), 1);
        assert!(emitted[0].contains("b.ks (1:8): Error: import cycle detected: "), "{}", emitted[0]);
    }

    #[test]
    fn missing_import_is_an_error() {
        let err = compile_source("main.ks", "let x = @import(\"nope\");", &CompilerOptions::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::Import { ref name, .. } if name == "nope"));
    }

    #[test]
    fn missing_import_is_reported_at_the_call() {
        let mut compiler = Compiler::new(&CompilerOptions::default());
        compiler
            .parse_main_source("main.ks", "let x = @import(\"nope\");")
            .unwrap_err();
        assert_eq!(
            compiler.context().diagnostics.emitted(),
            ["main.ks (1:8): Error: could not find module 'nope'\nlet x = @import(\"nope\");\n        ^"]
        );
    }

    #[test]
    fn stage_errors_map_to_error_kinds() {
        let lex = compile_source("bad.ks", "let s = \"open", &CompilerOptions::default());
        assert!(matches!(lex, Err(CoreError::Lex { .. })));
        let syntax = compile_source("bad.ks", "let s 1;", &CompilerOptions::default());
        assert!(matches!(syntax, Err(CoreError::Syntax { .. })));
        let pass = compile_source("bad.ks", "let s = 1 % 0;", &CompilerOptions::default());
        assert!(matches!(pass, Err(CoreError::Pass { pass: "const-fold" })));
        let io = compile("/no/such/main.ks", &CompilerOptions::default());
        assert!(matches!(io, Err(CoreError::SourceIo { .. })));
    }

    struct Reject;

    impl Pass for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        fn visit_block(&mut self, cx: &mut PassCx<'_>, id: StmtId, _slot: &mut Option<StmtId>) -> bool {
            let loc = cx.ast[id].loc;
            cx.error(loc, "rejected");
            false
        }
    }

    #[test]
    fn combined_pass_failure_stops_the_pipeline() {
        let mut compiler = Compiler::bare(&CompilerOptions::default());
        compiler.add_combined_pass(Reject);
        compiler.add_combined_pass(IrGen::new());
        compiler.parse_main_source("main.ks", "let x = 1;").unwrap();
        compiler.run_module_passes().unwrap();
        let err = compiler.run_combined_passes().unwrap_err();
        assert!(matches!(err, CoreError::Pass { pass: "reject" }));
        let irgen = compiler.combined_passes().get::<IrGen>(compiler.context()).unwrap();
        assert_eq!(irgen.declarations(), 0);
    }

    /// Records how many folds the module pipeline made.
    #[derive(Default)]
    struct FoldReport {
        folded: Option<usize>,
    }

    impl Pass for FoldReport {
        fn name(&self) -> &'static str {
            "fold-report"
        }

        fn visit_block(&mut self, cx: &mut PassCx<'_>, _id: StmtId, _slot: &mut Option<StmtId>) -> bool {
            self.folded = cx.lookup::<ConstFold>().map(ConstFold::folded);
            true
        }
    }

    #[test]
    fn combined_passes_see_module_passes() {
        let mut compiler = Compiler::new(&CompilerOptions::default());
        compiler.add_combined_pass(FoldReport::default());
        compiler
            .parse_main_source("main.ks", "let a = 1 + 2;\nlet b = 3 * 4;")
            .unwrap();
        compiler.run_module_passes().unwrap();
        compiler.run_combined_passes().unwrap();

        let report = compiler.combined_passes().get::<FoldReport>(compiler.context()).unwrap();
        assert_eq!(report.folded, Some(2));
    }

    #[test]
    fn search_path_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        let env = std::env::join_paths([dir.path().join("env1"), dir.path().join("env2")]).unwrap();
        let includes = vec![dir.path().join("inc")];

        let paths = CompilerOptions::search_path(&includes, Some(env.as_os_str()), &lib).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.path().join("inc"),
                dir.path().join("env1"),
                dir.path().join("env2"),
                lib.clone(),
            ]
        );

        let empty = OsString::new();
        let paths = CompilerOptions::search_path(&[], Some(empty.as_os_str()), &lib).unwrap();
        assert_eq!(paths, vec![lib]);

        let missing = dir.path().join("missing");
        assert!(matches!(
            CompilerOptions::search_path(&[], None, &missing),
            Err(CoreError::MissingLibraryRoot(_))
        ));
    }
}
