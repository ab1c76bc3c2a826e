// Snapshots
// One text file per server and database, one file pair per cube, with a
// temp-file-then-rename save and snapshot-plus-journal-replay load

use crate::core::{
    CubeId, DatabaseId, DimensionId, ElementId, OlapError, OlapResult, RuleId, ServerOptions,
};
use crate::cubes::{Cube, CubeStatus, CubeSubtype};
use crate::dimensions::{Dimension, DimensionSubtype};
use crate::elements::ElementKind;
use crate::io::format::{
    parse_identifiers, parse_weighted_pairs, read_records, LineBuilder, Record,
};
use crate::io::journal::{archive_journal, delete_journal, read_journal, JournalRecord,
    JournalWriter};
use crate::server::{names, Database, DatabaseStatus, DatabaseSubtype, Server};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SERVER_FILE: &str = "server.csv";
const DATABASE_FILE: &str = "database.csv";

fn cube_file_name(cube: CubeId) -> String {
    format!("database_CUBE_{}.csv", cube)
}

fn journal_path(data_file: &Path) -> PathBuf {
    data_file.with_extension("log")
}

fn tmp_path(data_file: &Path) -> PathBuf {
    let mut name = data_file.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write a snapshot through a temp file, archiving the journal
///
/// A rename failure at this point risks data loss, so it terminates the
/// process after logging, as do the other persistence rename paths.
fn write_snapshot(data_file: &Path, content: &str) -> OlapResult<()> {
    let tmp = tmp_path(data_file);
    {
        let file = std::fs::File::create(&tmp)?;
        use std::io::Write;
        let mut writer = std::io::BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    let journal = journal_path(data_file);
    archive_journal(&journal)?;

    if data_file.exists() {
        if let Err(err) = std::fs::remove_file(data_file) {
            log::error!("cannot remove data file '{}': {}", data_file.display(), err);
            log::error!("please check the underlying file system for errors");
            std::process::exit(1);
        }
    }

    delete_journal(&journal)?;

    if let Err(err) = std::fs::rename(&tmp, data_file) {
        log::error!("cannot rename data file '{}': {}", data_file.display(), err);
        log::error!("please check the underlying file system for errors");
        std::process::exit(1);
    }

    Ok(())
}

/// Adopt an orphaned temp file from a crashed save
fn adopt_tmp_file(data_file: &Path) -> OlapResult<()> {
    let tmp = tmp_path(data_file);
    if !data_file.exists() && tmp.exists() {
        log::warn!("using temp file for '{}'", data_file.display());
        delete_journal(&journal_path(data_file))?;
        if let Err(err) = std::fs::rename(&tmp, data_file) {
            log::error!("cannot rename temp file '{}': {}", tmp.display(), err);
            log::error!("please check the underlying file system for errors");
            std::process::exit(1);
        }
    }
    Ok(())
}

// snapshot builders

fn database_snapshot(db: &Database) -> String {
    let mut out = LineBuilder::new();
    out.comment("DATABASE DATA");
    out.comment("Description of data:");
    out.comment("SIZE_DIMENSIONS;SIZE_CUBES;");
    out.section("DATABASE");
    out.integer(db.dimension_count() as u32)
        .integer(db.cube_count() as u32);
    out.end_line();

    out.comment("Description of data:");
    out.comment("ID;NAME;TYPE;DELETABLE;RENAMABLE;CHANGABLE;ALIAS;");
    out.section("DIMENSIONS");
    for dimension in db.dimensions() {
        out.integer(dimension.id)
            .string(&dimension.name)
            .integer(dimension.subtype.code())
            .boolean(dimension.deletable)
            .boolean(dimension.renamable)
            .boolean(dimension.changable);
        match dimension.alias_source {
            Some(source) => out.integer(source),
            None => out.string(""),
        };
        out.end_line();
    }

    for dimension in db.dimensions() {
        out.comment("Description of data:");
        out.comment("ID;NAME;POSITION;TYPE;CHILDREN;");
        out.section(&format!("DIMENSION {}", dimension.id));
        for element in dimension.graph.elements() {
            out.integer(element.id)
                .string(&element.name)
                .integer(element.position)
                .integer(element.kind.code())
                .weighted_pairs(&element.children);
            out.end_line();
        }
    }

    out.comment("Description of data:");
    out.comment("ID;NAME;DIMENSIONS;TYPE;DELETABLE;RENAMABLE;");
    out.section("CUBES");
    for cube in db.cubes() {
        out.integer(cube.id)
            .string(&cube.name)
            .identifiers(&cube.dimensions)
            .integer(cube.subtype.code())
            .boolean(cube.deletable)
            .boolean(cube.renamable);
        out.end_line();
    }

    out.finish()
}

fn cube_snapshot(cube: &Cube, group_dimension: Option<&Dimension>) -> String {
    let mut out = LineBuilder::new();
    out.comment("CUBE DATA");
    out.comment("Description of data:");
    out.comment("ID;NAME;DIMENSIONS;TYPE;");
    out.section("CUBE");
    out.integer(cube.id)
        .string(&cube.name)
        .identifiers(&cube.dimensions)
        .integer(cube.subtype.code());
    out.end_line();

    // rights cubes over the group dimension persist a remap table so
    // group identity survives renames across load cycles
    if let Some(groups) = group_dimension {
        out.comment("Description of data:");
        out.comment("ID;NAME;");
        out.section("GROUP");
        for element in groups.graph.elements() {
            out.integer(element.id).string(&element.name);
            out.end_line();
        }
    }

    out.comment("Description of data:");
    out.comment("PATH;VALUE;");
    out.section("DOUBLE");
    for (coord, value) in cube.numeric.iter() {
        out.identifiers(coord).double(*value);
        out.end_line();
    }

    out.comment("Description of data:");
    out.comment("PATH;VALUE;");
    out.section("STRING");
    for (coord, value) in cube.strings.iter() {
        out.identifiers(coord).string(value);
        out.end_line();
    }

    out.comment("Description of data:");
    out.comment("ID;EXTERNAL;COMMENT;ACTIVE;TIMESTAMP;DEFINITION;");
    out.section("RULES");
    for rule in cube.rules.values() {
        out.integer(rule.id)
            .string(rule.external_id.as_deref().unwrap_or(""))
            .string(&rule.comment)
            .boolean(rule.active)
            .integer(rule.created_at.timestamp().max(0) as u32)
            .string(&rule.text);
        out.end_line();
    }

    out.finish()
}

fn server_snapshot(server: &Server) -> String {
    let mut out = LineBuilder::new();
    out.comment("SERVER DATA");
    out.comment("Description of data:");
    out.comment("SIZE_DATABASES;");
    out.section("SERVER");
    out.integer(server.database_count() as u32);
    out.end_line();

    out.comment("Description of data:");
    out.comment("ID;NAME;TYPE;DELETABLE;RENAMABLE;EXTENSIBLE;");
    out.section("DATABASES");
    for database in server.databases() {
        out.integer(database.id)
            .string(&database.name)
            .integer(database.subtype.code())
            .boolean(database.deletable)
            .boolean(database.renamable)
            .boolean(database.extensible);
        out.end_line();
    }

    out.finish()
}

// parsing helpers

fn field<'a>(values: &'a [String], at: usize, what: &str) -> OlapResult<&'a str> {
    values
        .get(at)
        .map(|s| s.as_str())
        .ok_or_else(|| OlapError::CorruptFile(format!("missing {} field", what)))
}

fn integer_field(values: &[String], at: usize, what: &str) -> OlapResult<u32> {
    field(values, at, what)?
        .parse()
        .map_err(|_| OlapError::CorruptFile(format!("bad {} field", what)))
}

fn double_field(values: &[String], at: usize, what: &str) -> OlapResult<f64> {
    field(values, at, what)?
        .parse()
        .map_err(|_| OlapError::CorruptFile(format!("bad {} field", what)))
}

fn bool_field(values: &[String], at: usize, what: &str) -> OlapResult<bool> {
    Ok(integer_field(values, at, what)? != 0)
}

/// Rule line parsed from a cube file, compiled once the whole server is
/// reloaded
#[derive(Debug, Clone)]
struct PendingRule {
    database: DatabaseId,
    cube: CubeId,
    id: RuleId,
    external_id: Option<String>,
    comment: String,
    active: bool,
    created_at: DateTime<Utc>,
    text: String,
}

impl Server {
    fn root_dir(&self) -> OlapResult<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| OlapError::Internal("server has no data directory".to_string()))
    }

    fn database_dir(&self, database: DatabaseId) -> OlapResult<PathBuf> {
        Ok(self.root_dir()?.join(&self.database(database)?.name))
    }

    /// Bind the server to a data directory and open the journals
    pub fn attach_root(&mut self, root: PathBuf) -> OlapResult<()> {
        std::fs::create_dir_all(&root)?;
        self.root = Some(root);
        let ids: Vec<DatabaseId> = self.databases().map(|d| d.id).collect();
        for id in ids {
            self.open_journals(id)?;
        }
        Ok(())
    }

    fn open_journals(&mut self, database: DatabaseId) -> OlapResult<()> {
        let dir = self.database_dir(database)?;
        std::fs::create_dir_all(&dir)?;
        let flush_every = self.options.journal_buffer_records;

        let cube_ids: Vec<CubeId> = self.database(database)?.cubes().map(|c| c.id).collect();
        let db = self.database_mut(database)?;
        db.journal = Some(JournalWriter::open(
            journal_path(&dir.join(DATABASE_FILE)),
            flush_every,
        )?);
        for cube in cube_ids {
            db.cube_journals.insert(
                cube,
                JournalWriter::open(journal_path(&dir.join(cube_file_name(cube))), flush_every)?,
            );
        }
        Ok(())
    }

    fn close_journals(&mut self, database: DatabaseId) -> OlapResult<()> {
        let db = self.database_mut(database)?;
        if let Some(journal) = db.journal.as_mut() {
            journal.close()?;
        }
        db.journal = None;
        for journal in db.cube_journals.values_mut() {
            journal.close()?;
        }
        db.cube_journals.clear();
        Ok(())
    }

    /// Save the server snapshot and every changed database
    pub fn save(&mut self) -> OlapResult<()> {
        let root = self.root_dir()?.to_path_buf();

        let changed: Vec<DatabaseId> = self
            .databases()
            .filter(|d| d.status == DatabaseStatus::Changed)
            .map(|d| d.id)
            .collect();
        for id in changed {
            self.save_database(id)?;
        }

        write_snapshot(&root.join(SERVER_FILE), &server_snapshot(self))?;
        log::info!("server snapshot saved");
        Ok(())
    }

    /// Save one database and all its cubes
    pub fn save_database(&mut self, database: DatabaseId) -> OlapResult<()> {
        if self.database(database)?.status == DatabaseStatus::Unloaded {
            return Err(OlapError::DatabaseNotLoaded(
                self.database(database)?.name.clone(),
            ));
        }

        let dir = self.database_dir(database)?;
        std::fs::create_dir_all(&dir)?;
        self.close_journals(database)?;

        {
            let db = self.database(database)?;
            write_snapshot(&dir.join(DATABASE_FILE), &database_snapshot(db))?;

            for cube in db.cubes() {
                let group_dimension = group_remap_dimension(db, cube);
                write_snapshot(
                    &dir.join(cube_file_name(cube.id)),
                    &cube_snapshot(cube, group_dimension),
                )?;
            }
        }

        self.open_journals(database)?;
        let db = self.database_mut(database)?;
        db.status = DatabaseStatus::Loaded;
        for cube in db.cubes_mut() {
            cube.status = CubeStatus::Loaded;
        }
        log::info!("database '{}' saved", self.database(database)?.name);
        Ok(())
    }

    /// Open a server from its data directory, creating it when absent
    pub fn open(options: ServerOptions) -> OlapResult<Server> {
        let root = options.data_directory.clone();
        let server_file = root.join(SERVER_FILE);

        if !server_file.exists() && !tmp_path(&server_file).exists() {
            let mut server = Server::with_options(options)?;
            server.attach_root(root)?;
            server.save()?;
            return Ok(server);
        }

        let mut server = Server::bare(options);
        server.root = Some(root.clone());
        std::fs::create_dir_all(&root)?;

        adopt_tmp_file(&server_file)?;
        let records = read_records(&server_file)?;
        let mut in_databases = false;
        let mut listed: Vec<(DatabaseId, String, DatabaseSubtype, bool, bool, bool)> = Vec::new();
        for record in records {
            match record {
                Record::Section(name) => in_databases = name == "DATABASES",
                Record::Values(values) if in_databases => {
                    let id = integer_field(&values, 0, "database id")?;
                    let name = field(&values, 1, "database name")?.to_string();
                    let code = integer_field(&values, 2, "database type")?;
                    let subtype = DatabaseSubtype::from_code(code).ok_or_else(|| {
                        OlapError::CorruptFile(format!("unknown database type {}", code))
                    })?;
                    let deletable = bool_field(&values, 3, "deletable")?;
                    let renamable = bool_field(&values, 4, "renamable")?;
                    let extensible = bool_field(&values, 5, "extensible")?;
                    listed.push((id, name, subtype, deletable, renamable, extensible));
                }
                Record::Values(_) => {}
            }
        }

        let mut pending_rules = Vec::new();
        for (id, name, subtype, deletable, renamable, extensible) in listed {
            let mut database = Database::new(id, &name, subtype);
            database.deletable = deletable;
            database.renamable = renamable;
            database.extensible = extensible;
            server.register_database(database)?;
            pending_rules.extend(server.load_database_files(id)?);
            if subtype == DatabaseSubtype::System {
                server.system_database = Some(id);
            }
        }

        if server.system_database.is_none() {
            crate::server::system::create_system_database(&mut server)?;
        } else {
            server.register_system_users()?;
        }

        server.compile_pending_rules(pending_rules);

        // reach a clean state: replayed journals are folded into fresh
        // snapshots and the journals restart empty
        let ids: Vec<DatabaseId> = server.databases().map(|d| d.id).collect();
        for id in ids {
            server.save_database(id)?;
        }
        write_snapshot(&root.join(SERVER_FILE), &server_snapshot(&server))?;

        log::info!("server loaded from '{}'", root.display());
        Ok(server)
    }

    /// Reload one database from its files, replacing the in-memory state
    pub fn load_database(&mut self, database: DatabaseId) -> OlapResult<()> {
        let (id, name, subtype, deletable, renamable, extensible) = {
            let db = self.database(database)?;
            (
                db.id,
                db.name.clone(),
                db.subtype,
                db.deletable,
                db.renamable,
                db.extensible,
            )
        };
        self.close_journals(database)?;
        self.drop_database_for_reload(database);
        let mut fresh = Database::new(id, &name, subtype);
        fresh.deletable = deletable;
        fresh.renamable = renamable;
        fresh.extensible = extensible;
        self.register_database(fresh)?;

        let pending = self.load_database_files(database)?;
        self.compile_pending_rules(pending);
        self.save_database(database)?;
        self.touch_database(database)?;
        Ok(())
    }

    /// Drop a database's in-memory structure, keeping its files
    ///
    /// The database must be saved first; an unsaved database would lose
    /// its changes.
    pub fn unload_database(&mut self, database: DatabaseId) -> OlapResult<()> {
        let (id, name, subtype, deletable, renamable, extensible) = {
            let db = self.database(database)?;
            if db.status == DatabaseStatus::Changed {
                return Err(OlapError::DatabaseUnsaved(db.name.clone()));
            }
            (
                db.id,
                db.name.clone(),
                db.subtype,
                db.deletable,
                db.renamable,
                db.extensible,
            )
        };

        self.close_journals(database)?;
        self.drop_database_for_reload(database);
        let mut shell = Database::new(id, &name, subtype);
        shell.deletable = deletable;
        shell.renamable = renamable;
        shell.extensible = extensible;
        shell.status = DatabaseStatus::Unloaded;
        self.register_database(shell)?;
        self.token.bump();
        log::info!("database '{}' unloaded", name);
        Ok(())
    }

    fn drop_database_for_reload(&mut self, database: DatabaseId) {
        // the slot is re-registered immediately with the same id
        if let Ok(db) = self.database(database) {
            let name = db.name.to_lowercase();
            self.forget_database_entry(database, &name);
        }
    }

    fn register_system_users(&mut self) -> OlapResult<()> {
        let registrations: Vec<(ElementId, String)> = {
            let system = self.system()?;
            let user_dim = system.find_dimension_by_name(names::USER_DIMENSION)?;
            user_dim
                .graph
                .elements()
                .map(|e| (e.id, e.name.clone()))
                .collect()
        };
        for (id, name) in registrations {
            self.users.register_internal(id, &name);
        }
        Ok(())
    }

    /// Read the snapshot and journals of one database into its arena slot
    fn load_database_files(&mut self, database: DatabaseId) -> OlapResult<Vec<PendingRule>> {
        let dir = self.database_dir(database)?;
        let data_file = dir.join(DATABASE_FILE);
        adopt_tmp_file(&data_file)?;

        {
            let db = self.database_mut(database)?;
            db.status = DatabaseStatus::Loading;
        }

        let records = read_records(&data_file)?;
        self.restore_database_structure(database, records)?;

        // cube files
        let cube_ids: Vec<CubeId> = self.database(database)?.cubes().map(|c| c.id).collect();
        let mut pending_rules = Vec::new();
        for cube in cube_ids {
            let cube_path = dir.join(cube_file_name(cube));
            adopt_tmp_file(&cube_path)?;
            if cube_path.exists() {
                pending_rules.extend(self.restore_cube_cells(database, cube, &cube_path)?);
            }
            // cell journal
            for record in read_journal(journal_path(&cube_path))? {
                self.replay_cube_record(database, cube, &record);
            }
        }

        // structural journal
        for record in read_journal(journal_path(&data_file))? {
            self.replay_database_record(database, &record);
        }

        // a pre-existing numeric HideElements element is coerced to
        // string on load
        self.coerce_hide_elements(database)?;

        let db = self.database_mut(database)?;
        db.status = DatabaseStatus::Changed;
        log::info!("database '{}' loaded", db.name);
        Ok(pending_rules)
    }

    fn restore_database_structure(
        &mut self,
        database: DatabaseId,
        records: Vec<Record>,
    ) -> OlapResult<()> {
        #[derive(PartialEq)]
        enum Part {
            Overview,
            Dimensions,
            Elements(DimensionId),
            Cubes,
        }

        let mut part = Part::Overview;
        for record in records {
            match record {
                Record::Section(name) => {
                    part = if name == "DATABASE" {
                        Part::Overview
                    } else if name == "DIMENSIONS" {
                        Part::Dimensions
                    } else if name == "CUBES" {
                        Part::Cubes
                    } else if let Some(id) = name.strip_prefix("DIMENSION ") {
                        Part::Elements(id.trim().parse().map_err(|_| {
                            OlapError::CorruptFile(format!("bad section '{}'", name))
                        })?)
                    } else {
                        return Err(OlapError::CorruptFile(format!("unknown section '{}'", name)));
                    };
                }
                Record::Values(values) => match part {
                    Part::Overview => {}
                    Part::Dimensions => {
                        let id = integer_field(&values, 0, "dimension id")?;
                        let name = field(&values, 1, "dimension name")?.to_string();
                        let code = integer_field(&values, 2, "dimension type")?;
                        let subtype = DimensionSubtype::from_code(code).ok_or_else(|| {
                            OlapError::CorruptFile(format!("unknown dimension type {}", code))
                        })?;
                        let mut dimension = Dimension::new(id, &name, subtype);
                        dimension.deletable = bool_field(&values, 3, "deletable")?;
                        dimension.renamable = bool_field(&values, 4, "renamable")?;
                        dimension.changable = bool_field(&values, 5, "changable")?;
                        let alias = field(&values, 6, "alias")?;
                        if !alias.is_empty() {
                            dimension.alias_source = Some(alias.parse().map_err(|_| {
                                OlapError::CorruptFile("bad alias field".to_string())
                            })?);
                        }
                        self.database_mut(database)?.add_dimension(dimension)?;
                    }
                    Part::Elements(dimension) => {
                        let id = integer_field(&values, 0, "element id")?;
                        let name = field(&values, 1, "element name")?.to_string();
                        let position = integer_field(&values, 2, "element position")?;
                        let code = integer_field(&values, 3, "element type")?;
                        let kind = ElementKind::from_code(code).ok_or_else(|| {
                            OlapError::CorruptFile(format!("unknown element type {}", code))
                        })?;
                        self.database_mut(database)?
                            .dimension_mut(dimension)?
                            .graph
                            .restore_element(id, &name, position, kind)?;
                    }
                    Part::Cubes => {
                        let id = integer_field(&values, 0, "cube id")?;
                        let name = field(&values, 1, "cube name")?.to_string();
                        let dims = parse_identifiers(field(&values, 2, "cube dimensions")?)?;
                        let code = integer_field(&values, 3, "cube type")?;
                        let subtype = CubeSubtype::from_code(code).ok_or_else(|| {
                            OlapError::CorruptFile(format!("unknown cube type {}", code))
                        })?;
                        let mut cube = Cube::new(id, &name, dims, subtype);
                        cube.deletable = bool_field(&values, 4, "deletable")?;
                        cube.renamable = bool_field(&values, 5, "renamable")?;
                        cube.status = CubeStatus::Loaded;
                        self.database_mut(database)?.add_cube(cube)?;
                    }
                },
            }
        }

        // children edges need every element present, so they are read in
        // a second pass over the element sections
        let records = read_records(self.database_dir(database)?.join(DATABASE_FILE))?;
        let mut current: Option<DimensionId> = None;
        for record in records {
            match record {
                Record::Section(name) => {
                    current = name
                        .strip_prefix("DIMENSION ")
                        .and_then(|id| id.trim().parse().ok());
                }
                Record::Values(values) => {
                    if let Some(dimension) = current {
                        let id = integer_field(&values, 0, "element id")?;
                        let pairs = parse_weighted_pairs(field(&values, 4, "children")?)?;
                        if !pairs.is_empty() {
                            self.database_mut(database)?
                                .dimension_mut(dimension)?
                                .graph
                                .add_children(id, &pairs)?;
                        }
                    }
                }
            }
        }

        let db = self.database_mut(database)?;
        let dim_ids: Vec<DimensionId> = db.dimensions().map(|d| d.id).collect();
        for dimension in dim_ids {
            db.dimension_mut(dimension)?.graph.finish_restore();
        }
        Ok(())
    }

    fn restore_cube_cells(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        path: &Path,
    ) -> OlapResult<Vec<PendingRule>> {
        let records = read_records(path)?;

        #[derive(PartialEq)]
        enum Part {
            Overview,
            Group,
            Double,
            Strings,
            Rules,
        }

        // remap persisted group ids onto the live group dimension
        let group_ids_by_name: HashMap<String, ElementId> = {
            let db = self.database(database)?;
            match db.find_dimension_by_name(names::GROUP_DIMENSION) {
                Ok(dimension) => {
                    let resolved = self.resolve_dimension(database, dimension.id)?;
                    resolved
                        .graph
                        .elements()
                        .map(|e| (e.name.to_lowercase(), e.id))
                        .collect()
                }
                Err(_) => HashMap::new(),
            }
        };
        let mut group_remap: HashMap<ElementId, ElementId> = HashMap::new();
        let remap_groups = {
            let db = self.database(database)?;
            let cube_ref = db.cube(cube)?;
            cube_ref.subtype == CubeSubtype::Rights
                && db
                    .dimension(cube_ref.dimensions[0])
                    .map(|d| d.name.eq_ignore_ascii_case(names::GROUP_DIMENSION))
                    .unwrap_or(false)
        };

        let mut part = Part::Overview;
        let mut pending = Vec::new();

        for record in records {
            match record {
                Record::Section(name) => {
                    part = match name.as_str() {
                        "CUBE" => Part::Overview,
                        "GROUP" => Part::Group,
                        "DOUBLE" => Part::Double,
                        "STRING" => Part::Strings,
                        "RULES" => Part::Rules,
                        other => {
                            return Err(OlapError::CorruptFile(format!(
                                "unknown section '{}'",
                                other
                            )))
                        }
                    };
                }
                Record::Values(values) => match part {
                    Part::Overview => {}
                    Part::Group => {
                        let old = integer_field(&values, 0, "group id")?;
                        let name = field(&values, 1, "group name")?.to_lowercase();
                        if let Some(current) = group_ids_by_name.get(&name) {
                            group_remap.insert(old, *current);
                        }
                    }
                    Part::Double => {
                        let mut coord = parse_identifiers(field(&values, 0, "path")?)?;
                        let value = double_field(&values, 1, "value")?;
                        if remap_groups {
                            match group_remap.get(&coord[0]) {
                                Some(current) => coord[0] = *current,
                                None if !group_remap.is_empty() => continue,
                                None => {}
                            }
                        }
                        self.database_mut(database)?
                            .cube_mut(cube)?
                            .store_numeric(coord, value);
                    }
                    Part::Strings => {
                        let mut coord = parse_identifiers(field(&values, 0, "path")?)?;
                        let value = field(&values, 1, "value")?.to_string();
                        if remap_groups {
                            match group_remap.get(&coord[0]) {
                                Some(current) => coord[0] = *current,
                                None if !group_remap.is_empty() => continue,
                                None => {}
                            }
                        }
                        self.database_mut(database)?
                            .cube_mut(cube)?
                            .store_text(coord, value);
                    }
                    Part::Rules => {
                        let id = integer_field(&values, 0, "rule id")?;
                        let external = field(&values, 1, "external id")?.to_string();
                        let comment = field(&values, 2, "comment")?.to_string();
                        let active = bool_field(&values, 3, "active")?;
                        let timestamp = integer_field(&values, 4, "timestamp")? as i64;
                        let text = field(&values, 5, "definition")?.to_string();
                        pending.push(PendingRule {
                            database,
                            cube,
                            id,
                            external_id: if external.is_empty() {
                                None
                            } else {
                                Some(external)
                            },
                            comment,
                            active,
                            created_at: DateTime::from_timestamp(timestamp, 0)
                                .unwrap_or_else(Utc::now),
                            text,
                        });
                    }
                },
            }
        }

        Ok(pending)
    }

    fn compile_pending_rules(&mut self, pending: Vec<PendingRule>) {
        for entry in pending {
            match crate::rules::Rule::compile(
                self,
                entry.database,
                entry.cube,
                entry.id,
                &entry.text,
                entry.external_id.clone(),
                &entry.comment,
            ) {
                Ok(mut rule) => {
                    rule.active = entry.active;
                    rule.created_at = entry.created_at;
                    let markers = if rule.active {
                        crate::rules::derive_markers(&rule, entry.cube)
                    } else {
                        Vec::new()
                    };
                    if let Ok(db) = self.database_mut(entry.database) {
                        if let Ok(cube_ref) = db.cube_mut(entry.cube) {
                            cube_ref.reserve_rule_ids(entry.id);
                            cube_ref.rules.insert(entry.id, rule);
                        }
                        for marker in markers {
                            let source = marker.source_cube;
                            if let Ok(source_ref) = db.cube_mut(source) {
                                source_ref.markers.push(marker);
                            }
                        }
                    }
                }
                Err(err) => {
                    log::error!("cannot compile stored rule '{}': {}", entry.text, err);
                }
            }
        }
    }

    fn coerce_hide_elements(&mut self, database: DatabaseId) -> OlapResult<()> {
        let target = {
            let db = self.database(database)?;
            db.find_dimension_by_name(names::CONFIGURATION_DIMENSION)
                .ok()
                .and_then(|dimension| {
                    dimension
                        .graph
                        .find_by_name(names::HIDE_ELEMENTS_ELEMENT)
                        .filter(|e| e.kind == ElementKind::Numeric)
                        .map(|e| (dimension.id, e.id))
                })
        };
        if let Some((dimension, element)) = target {
            self.database_mut(database)?
                .dimension_mut(dimension)?
                .graph
                .change_kind(element, ElementKind::Text)?;
        }
        Ok(())
    }

    // journal replay

    fn replay_database_record(&mut self, database: DatabaseId, record: &JournalRecord) {
        let outcome = self.apply_database_record(database, record);
        if let Err(err) = outcome {
            // replay against converged state is idempotent; already
            // resolved records are expected
            log::debug!("journal record '{}' skipped: {}", record.command, err);
        }
    }

    fn apply_database_record(
        &mut self,
        database: DatabaseId,
        record: &JournalRecord,
    ) -> OlapResult<()> {
        let ops = &record.operands;
        let db = self.database_mut(database)?;

        match record.command.as_str() {
            "addDimension" => {
                let name = field(ops, 1, "name")?;
                let code = integer_field(ops, 2, "type")?;
                let subtype = DimensionSubtype::from_code(code)
                    .ok_or_else(|| OlapError::CorruptFile("bad dimension type".into()))?;
                db.create_dimension(name, subtype)?;
            }
            "deleteDimension" => {
                let id = integer_field(ops, 0, "dimension")?;
                db.delete_dimension(id)?;
            }
            "renameDimension" => {
                let id = integer_field(ops, 0, "dimension")?;
                db.rename_dimension(id, field(ops, 1, "name")?)?;
            }
            "addCube" => {
                let name = field(ops, 1, "name")?;
                let dims = parse_identifiers(field(ops, 2, "dimensions")?)?;
                db.create_cube(name, dims, CubeSubtype::Normal)?;
            }
            "deleteCube" => {
                let id = integer_field(ops, 0, "cube")?;
                db.delete_cube(id)?;
            }
            "renameCube" => {
                let id = integer_field(ops, 0, "cube")?;
                db.rename_cube(id, field(ops, 1, "name")?)?;
            }
            "addElement" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let name = field(ops, 2, "name")?;
                let kind = ElementKind::from_code(integer_field(ops, 3, "type")?)
                    .ok_or_else(|| OlapError::CorruptFile("bad element type".into()))?;
                db.dimension_mut(dimension)?.add_element(name, kind)?;
            }
            "deleteElement" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let element = integer_field(ops, 1, "element")?;
                db.delete_element_cascading(dimension, element)?;
            }
            "renameElement" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let element = integer_field(ops, 1, "element")?;
                db.dimension_mut(dimension)?
                    .rename_element(element, field(ops, 2, "name")?)?;
            }
            "changeElementType" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let element = integer_field(ops, 1, "element")?;
                let kind = ElementKind::from_code(integer_field(ops, 2, "type")?)
                    .ok_or_else(|| OlapError::CorruptFile("bad element type".into()))?;
                db.dimension_mut(dimension)?.change_element_kind(element, kind)?;
            }
            "addChildren" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let parent = integer_field(ops, 1, "parent")?;
                let pairs = parse_weighted_pairs(field(ops, 2, "children")?)?;
                db.dimension_mut(dimension)?.add_children(parent, &pairs)?;
            }
            "removeChildren" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let parent = integer_field(ops, 1, "parent")?;
                db.dimension_mut(dimension)?.remove_children(parent)?;
            }
            "moveElement" => {
                let dimension = integer_field(ops, 0, "dimension")?;
                let element = integer_field(ops, 1, "element")?;
                let position = integer_field(ops, 2, "position")?;
                db.dimension_mut(dimension)?.move_element(element, position)?;
            }
            other => {
                return Err(OlapError::CorruptFile(format!(
                    "unknown journal command '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    fn replay_cube_record(&mut self, database: DatabaseId, cube: CubeId, record: &JournalRecord) {
        let outcome = self.apply_cube_record(database, cube, record);
        if let Err(err) = outcome {
            log::debug!("cube journal record '{}' skipped: {}", record.command, err);
        }
    }

    fn apply_cube_record(
        &mut self,
        database: DatabaseId,
        cube: CubeId,
        record: &JournalRecord,
    ) -> OlapResult<()> {
        let ops = &record.operands;
        let cube_ref = self.database_mut(database)?.cube_mut(cube)?;

        match record.command.as_str() {
            "setDouble" => {
                let coord = parse_identifiers(field(ops, 0, "path")?)?;
                let value = double_field(ops, 1, "value")?;
                cube_ref.store_numeric(coord, value);
            }
            "setString" => {
                let coord = parse_identifiers(field(ops, 0, "path")?)?;
                cube_ref.store_text(coord, field(ops, 1, "value")?.to_string());
            }
            "clearCell" => {
                let coord = parse_identifiers(field(ops, 0, "path")?)?;
                cube_ref.clear_cell(&coord);
            }
            other => {
                return Err(OlapError::CorruptFile(format!(
                    "unknown cube journal command '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Group dimension for the remap table of a rights cube, when its first
/// dimension is the group dimension
fn group_remap_dimension<'a>(db: &'a Database, cube: &Cube) -> Option<&'a Dimension> {
    if cube.subtype != CubeSubtype::Rights {
        return None;
    }
    let first = db.dimension(*cube.dimensions.first()?).ok()?;
    if first.name.eq_ignore_ascii_case(names::GROUP_DIMENSION) {
        Some(first)
    } else {
        None
    }
}
