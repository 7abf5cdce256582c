//! Experiment-wide settings: participant info, data files and the window.

use crate::error::BuilderResult;
use crate::param::{Param, ParamSet, ValueKind};
use crate::value::Value;
use crate::writer::IndentedWriter;

/// Units the window can be created with.
pub const WINDOW_UNITS: [&str; 4] = ["norm", "cm", "deg", "pix"];

/// Settings owned by every experiment. Written before and after the flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    params: ParamSet,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Defaults: info dialog and log file on, full-screen 1024x768 window.
    pub fn new() -> Self {
        let mut info = indexmap::IndexMap::new();
        info.insert("participant".to_string(), Value::from(""));
        info.insert("session".to_string(), Value::from("001"));

        let mut params = ParamSet::new();
        params.insert(
            "expName",
            Param::new("", ValueKind::Str).with_hint("Name of the entire experiment"),
        );
        params.insert(
            "Show info dlg",
            Param::new(true, ValueKind::Bool).with_hint(
                "Start the experiment with a dialog to set info (e.g. participant or condition)",
            ),
        );
        params.insert(
            "Experiment info",
            Param::new(Value::Dict(info), ValueKind::Code).with_hint(
                "The info to present in a dialog box. Right-click to check syntax and preview the dialog box.",
            ),
        );
        params.insert(
            "Save log file",
            Param::new(true, ValueKind::Bool)
                .with_hint("Save a detailed log (more detailed than the data file)"),
        );
        params.insert(
            "Full-screen window",
            Param::new(true, ValueKind::Bool)
                .with_hint("Run the experiment full-screen (recommended)"),
        );
        params.insert(
            "Window size (pixels)",
            Param::new(
                Value::List(vec![Value::Int(1024), Value::Int(768)]),
                ValueKind::Code,
            )
            .with_hint("Size of window (if not fullscreen)"),
        );
        params.insert(
            "Units",
            Param::new("norm", ValueKind::Str)
                .with_allowed_values(WINDOW_UNITS)
                .with_hint("Units to use for window/stimulus coordinates (e.g. cm, pix, deg)"),
        );
        params.insert(
            "Monitor",
            Param::new("testMonitor", ValueKind::Str)
                .with_hint("Name of the monitor (must match one in Monitor Center)"),
        );
        params.insert(
            "Screen",
            Param::new(1, ValueKind::Code).with_hint("Which physical screen to run on (1 or 2)"),
        );
        Self { params }
    }

    /// All params.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Mutable params.
    pub fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    /// Experiment name written into the script.
    pub fn exp_name(&self) -> String {
        self.params.text("expName")
    }

    /// Set the experiment name.
    pub fn set_exp_name(&mut self, name: &str) {
        if let Some(param) = self.params.get_mut("expName") {
            param.value = Value::from(name);
        }
    }

    fn flag(&self, name: &str) -> bool {
        match self.params.get(name).map(|p| &p.value) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Str(s)) => s.eq_ignore_ascii_case("true"),
            Some(other) => other.as_f64().is_some_and(|f| f != 0.0),
            None => false,
        }
    }

    /// Runtime libraries the settings code imports.
    pub fn required_libs(&self) -> Vec<&'static str> {
        let mut libs = vec!["visual"];
        if self.flag("Show info dlg") {
            libs.push("gui");
        }
        libs
    }

    /// Info dialog, data and log files, window creation.
    pub fn write_start_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        let p = &self.params;
        writer.write_indented("#store info about the experiment\n");
        writer.write_indented(&format!(
            "expName={}#from the Builder filename that created this script\n",
            p.render("expName")?
        ));
        writer.write_indented(&format!("expInfo={}\n", p.render("Experiment info")?));
        if self.flag("Show info dlg") {
            writer.write_indented("dlg=gui.DlgFromDict(dictionary=expInfo,title=expName)\n");
            writer.write_indented("if dlg.OK==False: core.quit() #user pressed cancel\n");
        }
        writer.write_indented("expInfo['date']=data.getDateStr()#add a simple timestamp\n");
        writer.write_indented("expInfo['expName']=expName\n");

        writer.write_indented("#setup files for saving\n");
        writer.write_indented("if not os.path.isdir('data'):\n");
        writer.indented(|w| {
            w.write_indented("os.makedirs('data')#if this fails (e.g. permissions) we will get error\n")
        });
        writer.write_indented(
            "filename='data' + os.path.sep + '%s_%s' %(expInfo['participant'], expInfo['date'])\n",
        );
        if self.flag("Save log file") {
            writer.write_indented(
                "logFile=psychopy.log.LogFile(filename+'.log', level=psychopy.log.EXP)\n",
            );
        }
        writer.write_indented(
            "psychopy.log.console.setLevel(psychopy.log.WARNING)#this outputs to the screen, not a file\n",
        );

        writer.blank_line();
        writer.write_indented("#setup the Window\n");
        writer.write_indented(&format!(
            "win=visual.Window(size={}, fullscr={}, screen={}, allowGUI=False,\n",
            p.render("Window size (pixels)")?,
            p.render("Full-screen window")?,
            p.render("Screen")?
        ));
        writer.write_indented(&format!(
            "    monitor={}, color=[0,0,0], colorSpace='rgb', units={})\n",
            p.render("Monitor")?,
            p.render("Units")?
        ));
        Ok(())
    }

    /// Close the window and quit.
    pub fn write_end_code(&self, writer: &mut IndentedWriter) -> BuilderResult<()> {
        writer.blank_line();
        writer.write_indented("#Shutting down:\n");
        writer.write_indented("win.close()\n");
        writer.write_indented("core.quit()\n");
        Ok(())
    }
}
